use std::sync::Arc;
use tracing::{debug, info, warn};
use super::super::config::MemoryConfig;
use super::super::error::MemoryResult;
use super::super::storage::MemoryStore;
use super::super::{ConsolidationResult, MemoryLevel};
use super::{matches_filters, meets_long_term_floor, ConsolidationEngine};

/// Keeps an owner's active memories per tier at or below the configured capacity.
///
/// The oldest overflow entries are forced one by one through the first rule
/// draining that tier whose tag and type filters they pass and whose target
/// floor they meet. Importance, access and age thresholds are ignored. An entry
/// no rule accepts stays, leaving the tier over capacity. Callers must hold the
/// owner's lock.
pub struct CapacityEnforcer {
    config: Arc<MemoryConfig>,
    store: Arc<dyn MemoryStore>,
    engine: Arc<ConsolidationEngine>,
}

impl CapacityEnforcer {
    pub fn new(config: Arc<MemoryConfig>, store: Arc<dyn MemoryStore>, engine: Arc<ConsolidationEngine>) -> Self {
        Self { config, store, engine }
    }

    /// Storage failures propagate; port failures are logged and leave the entry in place.
    pub async fn enforce(&self, level: MemoryLevel, owner_agent_id: &str) -> MemoryResult<Vec<ConsolidationResult>> {
        let capacity = match self.config.limits.capacity_for(level) {
            Some(capacity) => capacity,
            None => return Ok(Vec::new()),
        };

        let active: Vec<_> = self
            .store
            .list_by_level(level, Some(owner_agent_id))
            .await?
            .into_iter()
            .filter(|m| m.is_active())
            .collect();
        if active.len() <= capacity {
            return Ok(Vec::new());
        }

        let overflow = active.len() - capacity;
        let rules: Vec<_> = self.config.rules_for_source(level).collect();
        if rules.is_empty() {
            debug!(owner = owner_agent_id, %level, overflow, "over capacity but no rule drains this tier");
            return Ok(Vec::new());
        }
        let floor = self.config.limits.min_long_term_importance;

        let mut evicted = Vec::with_capacity(overflow);
        // list_by_level is oldest first
        for memory in active.into_iter().take(overflow) {
            let group = std::slice::from_ref(&memory);
            let rule = match rules
                .iter()
                .copied()
                .find(|rule| matches_filters(rule, &memory) && meets_long_term_floor(rule, group, floor))
            {
                Some(rule) => rule,
                None => {
                    debug!(owner = owner_agent_id, memory_id = %memory.id, %level, "no rule accepts overflow entry");
                    continue;
                }
            };
            match self.engine.apply(rule, group).await {
                Ok(result) => evicted.push(result),
                Err(e) if e.is_transient() => {
                    warn!(owner = owner_agent_id, memory_id = %memory.id, error = %e, "capacity eviction deferred");
                }
                Err(e) => return Err(e),
            }
        }

        if !evicted.is_empty() {
            info!(owner = owner_agent_id, %level, evicted = evicted.len(), capacity, "enforced tier capacity");
        }
        Ok(evicted)
    }
}
