use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use super::super::config::{ConsolidationRule, MemoryConfig};
use super::super::embedding::EmbeddingProviderTrait;
use super::super::grouping::SimilarityGrouper;
use super::super::storage::MemoryStore;
use super::super::{Memory, MemoryLevel};
use super::{is_eligible, meets_long_term_floor, CapacityEnforcer, ConsolidationEngine, OwnerLocks};

/// Counters from one consolidation cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub rules_evaluated: usize,
    pub groups_consolidated: usize,
    pub groups_failed: usize,
    pub groups_skipped: usize,
    pub memories_consolidated: usize,
    pub embeddings_repaired: usize,
    pub capacity_evictions: usize,
    /// Stopped early because shutdown was requested
    pub interrupted: bool,
}

/// One pass over every rule. Cycles never overlap: concurrent callers wait.
pub struct ConsolidationCycle {
    config: Arc<MemoryConfig>,
    store: Arc<dyn MemoryStore>,
    embedder: Arc<dyn EmbeddingProviderTrait>,
    engine: Arc<ConsolidationEngine>,
    enforcer: Arc<CapacityEnforcer>,
    owner_locks: Arc<OwnerLocks>,
    grouper: SimilarityGrouper,
    running: Mutex<()>,
}

impl ConsolidationCycle {
    pub fn new(
        config: Arc<MemoryConfig>,
        store: Arc<dyn MemoryStore>,
        embedder: Arc<dyn EmbeddingProviderTrait>,
        engine: Arc<ConsolidationEngine>,
        enforcer: Arc<CapacityEnforcer>,
        owner_locks: Arc<OwnerLocks>,
    ) -> Self {
        let grouper = SimilarityGrouper::new(config.limits.similarity_threshold);
        Self {
            config,
            store,
            embedder,
            engine,
            enforcer,
            owner_locks,
            grouper,
            running: Mutex::new(()),
        }
    }

    pub async fn run(&self) -> CycleReport {
        self.run_until(&AtomicBool::new(false)).await
    }

    /// Run one cycle, checking `stop` between groups. The group in flight
    /// when `stop` is raised always completes.
    pub async fn run_until(&self, stop: &AtomicBool) -> CycleReport {
        let _cycle = self.running.lock().await;
        let mut report = CycleReport::default();

        report.embeddings_repaired = self.repair_embeddings().await;

        for rule in &self.config.consolidation_rules {
            if stop.load(Ordering::SeqCst) {
                report.interrupted = true;
                break;
            }
            report.rules_evaluated += 1;
            self.apply_rule(rule, stop, &mut report).await;
        }

        if !report.interrupted {
            self.enforce_capacities(&mut report).await;
        }

        info!(
            rules = report.rules_evaluated,
            consolidated = report.groups_consolidated,
            failed = report.groups_failed,
            evictions = report.capacity_evictions,
            interrupted = report.interrupted,
            "consolidation cycle finished"
        );
        report
    }

    async fn apply_rule(&self, rule: &ConsolidationRule, stop: &AtomicBool, report: &mut CycleReport) {
        let owners = match self.active_owners(rule.source_level).await {
            Some(owners) => owners,
            None => {
                report.groups_failed += 1;
                return;
            }
        };

        for owner in owners {
            let lock = self.owner_locks.lock_for(&owner);
            let _owner_guard = lock.lock().await;

            let now = Utc::now();
            let candidates: Vec<Memory> = match self.store.list_by_level(rule.source_level, Some(&owner)).await {
                Ok(memories) => memories
                    .into_iter()
                    .filter(|m| is_eligible(rule, m, now, &self.config.ttl))
                    .collect(),
                Err(e) => {
                    warn!(owner = %owner, from = %rule.source_level, error = %e, "failed to load candidates");
                    report.groups_failed += 1;
                    continue;
                }
            };
            if candidates.is_empty() {
                continue;
            }

            let groups = if rule.transformations.combine_related {
                self.grouper.group(candidates)
            } else {
                candidates.into_iter().map(|m| vec![m]).collect()
            };
            debug!(owner = %owner, from = %rule.source_level, to = %rule.target_level, groups = groups.len(), "grouped candidates");

            for group in groups {
                if stop.load(Ordering::SeqCst) {
                    report.interrupted = true;
                    return;
                }
                if !meets_long_term_floor(rule, &group, self.config.limits.min_long_term_importance) {
                    report.groups_skipped += 1;
                    continue;
                }
                match self.engine.apply(rule, &group).await {
                    Ok(result) => {
                        report.groups_consolidated += 1;
                        report.memories_consolidated += result.source_memories.len();
                    }
                    Err(e) => {
                        warn!(owner = %owner, group_size = group.len(), error = %e, "group consolidation failed");
                        report.groups_failed += 1;
                    }
                }
            }
        }
    }

    async fn enforce_capacities(&self, report: &mut CycleReport) {
        for level in [MemoryLevel::WorkingMemory, MemoryLevel::ShortTerm] {
            let owners = match self.active_owners(level).await {
                Some(owners) => owners,
                None => continue,
            };
            for owner in owners {
                let lock = self.owner_locks.lock_for(&owner);
                let _owner_guard = lock.lock().await;
                match self.enforcer.enforce(level, &owner).await {
                    Ok(evicted) => report.capacity_evictions += evicted.len(),
                    Err(e) => warn!(owner = %owner, %level, error = %e, "capacity enforcement failed"),
                }
            }
        }
    }

    /// Embeddings that failed at insert time are retried here so the memories
    /// become eligible for similarity grouping again.
    async fn repair_embeddings(&self) -> usize {
        let levels: BTreeSet<MemoryLevel> = self.config.consolidation_rules.iter().map(|r| r.source_level).collect();
        let mut repaired = 0;
        for level in levels {
            let missing: Vec<Memory> = match self.store.list_by_level(level, None).await {
                Ok(memories) => memories
                    .into_iter()
                    .filter(|m| m.is_active() && m.embeddings.is_none() && !m.content.is_empty())
                    .collect(),
                Err(e) => {
                    warn!(%level, error = %e, "failed to list memories for embedding repair");
                    continue;
                }
            };
            for memory in missing {
                match self.embedder.embed_text(&memory.content).await {
                    Ok(embedding) => match self.store.set_embeddings(&memory.id, &embedding).await {
                        Ok(()) => repaired += 1,
                        Err(e) => warn!(memory_id = %memory.id, error = %e, "failed to store repaired embedding"),
                    },
                    Err(e) => {
                        // service is down, no point hammering it for the rest
                        debug!(error = %e, "embedding repair postponed");
                        return repaired;
                    }
                }
            }
        }
        repaired
    }

    async fn active_owners(&self, level: MemoryLevel) -> Option<BTreeSet<String>> {
        match self.store.list_by_level(level, None).await {
            Ok(memories) => Some(
                memories
                    .into_iter()
                    .filter(|m| m.is_active())
                    .map(|m| m.metadata.owner_agent_id)
                    .collect(),
            ),
            Err(e) => {
                warn!(%level, error = %e, "failed to list owners");
                None
            }
        }
    }
}
