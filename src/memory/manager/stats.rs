use chrono::{DateTime, Duration, Utc};
use super::super::{Memory, MemoryLevel, MemoryStats};

impl MemoryStats {
    /// Aggregate over an owner's memories. Empty input yields zeroed stats.
    pub fn from_memories(memories: &[Memory], now: DateTime<Utc>) -> Self {
        let mut stats = MemoryStats {
            total_memories: memories.len(),
            ..Default::default()
        };
        if memories.is_empty() {
            return stats;
        }

        let mut access_total: u64 = 0;
        let mut retained = 0usize;
        let mut recent = 0usize;
        let mut recent_long_term = 0usize;
        let window_start = now - Duration::hours(24);

        for memory in memories {
            *stats.by_level.entry(memory.level).or_insert(0) += 1;
            *stats.by_type.entry(memory.metadata.memory_type.clone()).or_insert(0) += 1;
            *stats.by_importance.entry(memory.importance).or_insert(0) += 1;

            access_total += memory.access_count;
            if memory.access_count > 1 {
                retained += 1;
            }
            if memory.created_at >= window_start {
                recent += 1;
                if memory.level == MemoryLevel::LongTerm {
                    recent_long_term += 1;
                }
            }
        }

        let total = memories.len() as f64;
        stats.average_access_count = access_total as f64 / total;
        stats.retention_rate = retained as f64 / total;
        stats.consolidation_rate = if recent == 0 {
            0.0
        } else {
            recent_long_term as f64 / recent as f64
        };
        stats
    }
}
