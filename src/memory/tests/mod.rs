pub mod types_tests;
pub mod grouping_tests;
pub mod consolidation_tests;

pub use test_utils::*;
