// Tier promotion: rule evaluation, group consolidation, capacity and scheduling
mod rules;
mod engine;
mod locks;
mod capacity;
mod cycle;
mod scheduler;

pub use rules::{is_eligible, matches_filters, meets_long_term_floor};
pub use engine::ConsolidationEngine;
pub use locks::OwnerLocks;
pub use capacity::CapacityEnforcer;
pub use cycle::{ConsolidationCycle, CycleReport};
pub use scheduler::{ConsolidationScheduler, SchedulerState};
