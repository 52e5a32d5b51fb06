pub mod memory_manager;
mod stats;

pub use memory_manager::MemoryManager;
