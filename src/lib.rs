pub mod memory;
pub mod logging;

pub use memory::*;
