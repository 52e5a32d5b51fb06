//! Partitioning of consolidation candidates into related groups.
//!
//! Grouping is greedy and founder-relative: each group is opened by the first
//! unassigned candidate (in input order) and collects every later unassigned
//! candidate related *to that founder*. Relatedness is not closed transitively,
//! so two non-founder members of a group may be unrelated to each other.

use super::storage::cosine_similarity;
use super::Memory;

/// Minimum number of shared tags for two memories to count as related
pub const MIN_SHARED_TAGS: usize = 2;

#[derive(Debug, Clone)]
pub struct SimilarityGrouper {
    similarity_threshold: f32,
}

impl SimilarityGrouper {
    pub fn new(similarity_threshold: f32) -> Self {
        Self { similarity_threshold }
    }

    pub fn similarity_threshold(&self) -> f32 {
        self.similarity_threshold
    }

    /// True when any link holds: shared task, explicit reference, two shared tags,
    /// or embedding cosine at or above the threshold.
    pub fn related(&self, a: &Memory, b: &Memory) -> bool {
        if let (Some(task_a), Some(task_b)) = (&a.metadata.task_id, &b.metadata.task_id) {
            if task_a == task_b {
                return true;
            }
        }

        if a.metadata.related_memories.contains(&b.id) {
            return true;
        }

        if a.metadata.tags.intersection(&b.metadata.tags).take(MIN_SHARED_TAGS).count() >= MIN_SHARED_TAGS {
            return true;
        }

        match (&a.embeddings, &b.embeddings) {
            (Some(ea), Some(eb)) if !ea.is_empty() && ea.len() == eb.len() => {
                cosine_similarity(ea, eb) >= self.similarity_threshold
            }
            _ => false,
        }
    }

    /// Partition `candidates`; every input appears in exactly one group and
    /// groups keep input order.
    pub fn group(&self, candidates: Vec<Memory>) -> Vec<Vec<Memory>> {
        let mut slots: Vec<Option<Memory>> = candidates.into_iter().map(Some).collect();
        let mut groups = Vec::new();

        for i in 0..slots.len() {
            let founder = match slots[i].take() {
                Some(memory) => memory,
                None => continue,
            };

            let mut members = Vec::new();
            for slot in slots.iter_mut().skip(i + 1) {
                let joins = slot.as_ref().map_or(false, |other| self.related(&founder, other));
                if joins {
                    members.extend(slot.take());
                }
            }

            let mut group = Vec::with_capacity(members.len() + 1);
            group.push(founder);
            group.extend(members);
            groups.push(group);
        }

        groups
    }
}
