use super::super::*;
use super::test_utils::*;
use chrono::{Duration, Utc};

#[test]
fn test_memory_creation() {
    let memory = Memory::new("hello".to_string(), metadata(), MemoryLevel::WorkingMemory, Importance::Low);

    assert!(!memory.id.is_empty());
    assert_eq!(memory.access_count, 1);
    assert_eq!(memory.created_at, memory.last_accessed);
    assert!(memory.embeddings.is_none());
    assert!(memory.is_active());
}

#[test]
fn test_consolidated_tag_deactivates() {
    let mut memory = memory_at(MemoryLevel::WorkingMemory, "hello");
    memory.metadata.tags.insert(CONSOLIDATED_TAG.to_string());
    assert!(memory.is_consolidated());
    assert!(!memory.is_active());
}

#[test]
fn test_level_ranks() {
    assert!(MemoryLevel::WorkingMemory.rank() < MemoryLevel::ShortTerm.rank());
    assert!(MemoryLevel::ShortTerm.rank() < MemoryLevel::LongTerm.rank());
    assert_eq!(MemoryLevel::LongTerm.rank(), MemoryLevel::Semantic.rank());
    assert_eq!(MemoryLevel::LongTerm.rank(), MemoryLevel::Episodic.rank());
}

#[test]
fn test_level_parse() {
    for level in MemoryLevel::ALL {
        assert_eq!(level.to_string().parse::<MemoryLevel>(), Ok(level));
    }
    assert!("MidTerm".parse::<MemoryLevel>().is_err());
}

#[test]
fn test_importance_ordering() {
    assert!(Importance::Low < Importance::Medium);
    assert!(Importance::High < Importance::Critical);
    assert_eq!(Importance::from_i64(Importance::High.as_i64()), Some(Importance::High));
    assert_eq!(Importance::from_i64(9), None);
}

#[test]
fn test_metadata_serializes_camel_case() {
    let metadata = metadata().with_task("T1").with_tags(["a"]);
    let value = serde_json::to_value(&metadata).unwrap();

    assert_eq!(value["type"], "note");
    assert_eq!(value["ownerAgentId"], TEST_OWNER);
    assert_eq!(value["taskId"], "T1");
    assert_eq!(value["projectId"], TEST_PROJECT);
}

#[test]
fn test_metadata_rejects_unknown_keys() {
    let result: Result<MemoryMetadata, _> = serde_json::from_str(
        r#"{"source":"s","type":"t","ownerAgentId":"a","projectId":"p","color":"blue"}"#,
    );
    assert!(result.is_err());
}

#[test]
fn test_query_importance_filter() {
    let low = memory_at(MemoryLevel::WorkingMemory, "low");
    let mut medium = memory_at(MemoryLevel::WorkingMemory, "medium");
    medium.importance = Importance::Medium;

    let query = MemoryQuery::new("x", TEST_PROJECT).with_importance(Importance::Medium);
    assert!(!query.matches(&low, 1.0));
    assert!(query.matches(&medium, 1.0));
}

#[test]
fn test_query_requires_all_tags() {
    let mut memory = memory_at(MemoryLevel::WorkingMemory, "tagged");
    memory.metadata.tags.extend(["rust".to_string(), "async".to_string()]);

    assert!(MemoryQuery::new("x", TEST_PROJECT).with_tags(["rust"]).matches(&memory, 0.5));
    assert!(MemoryQuery::new("x", TEST_PROJECT).with_tags(["rust", "async"]).matches(&memory, 0.5));
    assert!(!MemoryQuery::new("x", TEST_PROJECT).with_tags(["rust", "go"]).matches(&memory, 0.5));
}

#[test]
fn test_query_time_range_is_inclusive() {
    let memory = memory_at(MemoryLevel::WorkingMemory, "now");
    let at = memory.created_at;

    assert!(MemoryQuery::new("x", TEST_PROJECT).with_time_range(at, at).matches(&memory, 0.0));
    let later = Utc::now() + Duration::hours(1);
    assert!(!MemoryQuery::new("x", TEST_PROJECT)
        .with_time_range(later, later + Duration::hours(1))
        .matches(&memory, 0.0));
}

#[test]
fn test_query_level_type_and_similarity() {
    let memory = memory_at(MemoryLevel::ShortTerm, "typed");

    assert!(MemoryQuery::new("x", TEST_PROJECT).with_level(MemoryLevel::ShortTerm).matches(&memory, 0.0));
    assert!(!MemoryQuery::new("x", TEST_PROJECT).with_level(MemoryLevel::LongTerm).matches(&memory, 0.0));
    assert!(!MemoryQuery::new("x", TEST_PROJECT).with_type("fact").matches(&memory, 0.0));
    assert!(!MemoryQuery::new("x", TEST_PROJECT).with_min_similarity(0.8).matches(&memory, 0.79));
    assert!(MemoryQuery::new("x", TEST_PROJECT).with_min_similarity(0.8).matches(&memory, 0.8));
}
