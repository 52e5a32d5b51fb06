use chrono::{DateTime, Utc};
use super::super::config::{ConsolidationRule, TierTtl};
use super::super::{Importance, Memory, MemoryLevel};

/// Whether `memory` may be consolidated by `rule` at `now`.
///
/// Consolidated memories are never eligible. A memory older than its tier TTL
/// skips the importance, access-count and age thresholds; tag and type filters
/// always apply.
pub fn is_eligible(rule: &ConsolidationRule, memory: &Memory, now: DateTime<Utc>, ttl: &TierTtl) -> bool {
    if !matches_filters(rule, memory) {
        return false;
    }

    let conditions = &rule.conditions;
    let age = memory.age(now);
    let expired = ttl.ttl_for(memory.level).map_or(false, |ttl| age >= ttl);
    if expired {
        return true;
    }

    memory.importance >= conditions.min_importance
        && memory.access_count >= conditions.min_access_count
        && age >= conditions.min_age()
}

/// Level, activity and tag/type filters of `rule`, without any threshold.
pub fn matches_filters(rule: &ConsolidationRule, memory: &Memory) -> bool {
    if memory.level != rule.source_level || !memory.is_active() {
        return false;
    }

    let conditions = &rule.conditions;
    if let Some(ref required_tags) = conditions.required_tags {
        if !required_tags.iter().all(|tag| memory.metadata.tags.contains(tag)) {
            return false;
        }
    }
    if let Some(ref required_types) = conditions.required_types {
        if !required_types.iter().any(|t| t == &memory.metadata.memory_type) {
            return false;
        }
    }
    true
}

/// LongTerm only accepts groups whose most important member reaches `floor`.
pub fn meets_long_term_floor(rule: &ConsolidationRule, group: &[Memory], floor: Importance) -> bool {
    if rule.target_level != MemoryLevel::LongTerm {
        return true;
    }
    group.iter().map(|m| m.importance).max().map_or(false, |max| max >= floor)
}
