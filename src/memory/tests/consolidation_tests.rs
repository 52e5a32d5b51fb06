use super::super::config::*;
use super::super::consolidation::{is_eligible, meets_long_term_floor};
use super::super::summarization::instructions;
use super::super::*;
use super::test_utils::*;
use chrono::Utc;
use std::sync::atomic::AtomicBool;

fn wm_rule() -> ConsolidationRule {
    ConsolidationRule::new(MemoryLevel::WorkingMemory, MemoryLevel::ShortTerm)
}

fn task_memory(content: &str, task: &str, hours: i64) -> Memory {
    let mut memory = aged_memory(MemoryLevel::WorkingMemory, content, hours);
    memory.metadata.task_id = Some(task.to_string());
    memory
}

// rules

#[test]
fn test_eligibility_thresholds() {
    let rule = wm_rule().with_conditions(RuleConditions {
        min_importance: Importance::Medium,
        min_access_count: 2,
        min_age_secs: 3600,
        ..Default::default()
    });
    let ttl = TierTtl::default();
    let now = Utc::now();

    let mut memory = aged_memory(MemoryLevel::WorkingMemory, "m", 2);
    assert!(!is_eligible(&rule, &memory, now, &ttl));

    memory.importance = Importance::High;
    assert!(!is_eligible(&rule, &memory, now, &ttl));

    memory.access_count = 2;
    assert!(is_eligible(&rule, &memory, now, &ttl));

    let mut young = memory_at(MemoryLevel::WorkingMemory, "young");
    young.importance = Importance::High;
    young.access_count = 5;
    assert!(!is_eligible(&rule, &young, now, &ttl));
}

#[test]
fn test_consolidated_memory_never_eligible() {
    let mut memory = aged_memory(MemoryLevel::WorkingMemory, "done", 48);
    memory.metadata.tags.insert(CONSOLIDATED_TAG.to_string());
    assert!(!is_eligible(&wm_rule(), &memory, Utc::now(), &TierTtl::default()));
}

#[test]
fn test_wrong_level_never_eligible() {
    let memory = aged_memory(MemoryLevel::ShortTerm, "st", 48);
    assert!(!is_eligible(&wm_rule(), &memory, Utc::now(), &TierTtl::default()));
}

#[test]
fn test_ttl_expiry_bypasses_thresholds() {
    let rule = wm_rule().with_conditions(RuleConditions {
        min_importance: Importance::Critical,
        min_access_count: 10,
        min_age_secs: 0,
        ..Default::default()
    });
    let ttl = TierTtl::default();

    let fresh = aged_memory(MemoryLevel::WorkingMemory, "fresh", 1);
    let expired = aged_memory(MemoryLevel::WorkingMemory, "expired", 25);
    assert!(!is_eligible(&rule, &fresh, Utc::now(), &ttl));
    assert!(is_eligible(&rule, &expired, Utc::now(), &ttl));
}

#[test]
fn test_ttl_expiry_keeps_filters() {
    let rule = wm_rule().with_conditions(RuleConditions {
        required_types: Some(vec!["fact".to_string()]),
        required_tags: Some(["verified".to_string()].into_iter().collect()),
        ..Default::default()
    });
    let ttl = TierTtl::default();

    let mut memory = aged_memory(MemoryLevel::WorkingMemory, "expired", 25);
    assert!(!is_eligible(&rule, &memory, Utc::now(), &ttl));

    memory.metadata.memory_type = "fact".to_string();
    assert!(!is_eligible(&rule, &memory, Utc::now(), &ttl));

    memory.metadata.tags.insert("verified".to_string());
    assert!(is_eligible(&rule, &memory, Utc::now(), &ttl));
}

#[test]
fn test_unbounded_durations_never_make_memories_eligible() {
    let rule = wm_rule().with_conditions(RuleConditions {
        min_importance: Importance::Critical,
        min_age_secs: u64::MAX / 2,
        ..Default::default()
    });
    let ttl = TierTtl {
        working_memory_secs: Some(u64::MAX),
        ..Default::default()
    };

    let mut memory = aged_memory(MemoryLevel::WorkingMemory, "fresh", 1);
    assert!(!is_eligible(&rule, &memory, Utc::now(), &ttl));

    memory.importance = Importance::Critical;
    assert!(!is_eligible(&rule, &memory, Utc::now(), &ttl));
}

#[test]
fn test_long_term_floor() {
    let to_long_term = ConsolidationRule::new(MemoryLevel::ShortTerm, MemoryLevel::LongTerm);
    let to_semantic = ConsolidationRule::new(MemoryLevel::ShortTerm, MemoryLevel::Semantic);

    let low = memory_at(MemoryLevel::ShortTerm, "low");
    let mut high = memory_at(MemoryLevel::ShortTerm, "high");
    high.importance = Importance::High;

    assert!(!meets_long_term_floor(&to_long_term, &[low.clone()], Importance::Medium));
    assert!(meets_long_term_floor(&to_long_term, &[low.clone(), high], Importance::Medium));
    assert!(meets_long_term_floor(&to_semantic, &[low], Importance::Medium));
}

// engine

#[tokio::test]
async fn test_apply_builds_consolidated_memory() {
    let env = TestEnv::new();
    let mut a = task_memory("first step", "T1", 1);
    a.metadata = a.metadata.with_tags(["deploy", "ci"]);
    let mut b = task_memory("second step", "T1", 1);
    b.importance = Importance::High;
    b.metadata = b.metadata.with_tags(["ci", "rollback"]);
    env.put(&a).await;
    env.put(&b).await;

    let result = env.engine().apply(&wm_rule(), &[a.clone(), b.clone()]).await.unwrap();
    let merged = &result.new_memory;

    assert_eq!(result.level, MemoryLevel::ShortTerm);
    assert_eq!(result.source_memories, vec![a.id.clone(), b.id.clone()]);
    assert_eq!(merged.level, MemoryLevel::ShortTerm);
    assert_eq!(merged.content, "summary of 2 memories");
    assert_eq!(result.summary, merged.content);
    assert_eq!(merged.importance, Importance::High);
    assert_eq!(merged.access_count, 1);
    assert!(merged.embeddings.is_some());

    let meta = &merged.metadata;
    assert_eq!(meta.source, "consolidation");
    assert_eq!(meta.memory_type, "note");
    assert_eq!(meta.owner_agent_id, TEST_OWNER);
    assert_eq!(meta.project_id, TEST_PROJECT);
    assert_eq!(meta.task_id.as_deref(), Some("T1"));
    assert!(!meta.tags.contains(CONSOLIDATED_TAG));
    assert_eq!(meta.tags.len(), 3);
    assert!(meta.related_memories.contains(&a.id) && meta.related_memories.contains(&b.id));

    assert!(env.store.get(&merged.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_apply_is_non_destructive() {
    let env = TestEnv::new();
    let a = task_memory("first", "T1", 1);
    let b = task_memory("second", "T1", 1);
    env.put(&a).await;
    env.put(&b).await;

    env.engine().apply(&wm_rule(), &[a.clone(), b.clone()]).await.unwrap();

    assert_eq!(env.store.len().await, 3);
    for original in [&a, &b] {
        let stored = env.store.get(&original.id).await.unwrap().unwrap();
        assert_eq!(stored.content, original.content);
        assert_eq!(stored.level, MemoryLevel::WorkingMemory);
        assert!(stored.is_consolidated());
    }
}

#[tokio::test]
async fn test_apply_drops_unshared_task() {
    let env = TestEnv::new();
    let a = task_memory("first", "T1", 1);
    let b = task_memory("second", "T2", 1);
    env.put(&a).await;
    env.put(&b).await;

    let result = env.engine().apply(&wm_rule(), &[a, b]).await.unwrap();
    assert!(result.new_memory.metadata.task_id.is_none());
}

#[tokio::test]
async fn test_apply_rejects_bad_groups() {
    let env = TestEnv::new();
    let engine = env.engine();

    assert!(matches!(
        engine.apply(&wm_rule(), &[]).await,
        Err(MemoryError::Validation(_))
    ));

    let short_term = memory_at(MemoryLevel::ShortTerm, "wrong tier");
    env.put(&short_term).await;
    assert!(matches!(
        engine.apply(&wm_rule(), &[short_term]).await,
        Err(MemoryError::Validation(_))
    ));
}

#[tokio::test]
async fn test_apply_sections_in_order() {
    let env = TestEnv::new();
    let memory = task_memory("only", "T1", 1);
    env.put(&memory).await;

    let rule = wm_rule().with_transformations(Transformations {
        summarize: true,
        combine_related: true,
        extract_patterns: true,
        generalize_knowledge: true,
    });
    let result = env.engine().apply(&rule, &[memory]).await.unwrap();

    assert_eq!(
        result.new_memory.content,
        "summary of 1 memories\n\nPatterns identified:\npatterns of 1 memories\n\nGeneralized knowledge:\nknowledge of 1 memories"
    );
}

#[tokio::test]
async fn test_apply_skips_failed_pass() {
    let env = TestEnv::new();
    env.summarizer.fail_pass(instructions::EXTRACT_PATTERNS);
    let memory = task_memory("only", "T1", 1);
    env.put(&memory).await;

    let rule = wm_rule().with_transformations(Transformations {
        summarize: true,
        extract_patterns: true,
        ..Default::default()
    });
    let result = env.engine().apply(&rule, &[memory]).await.unwrap();
    assert_eq!(result.new_memory.content, "summary of 1 memories");
}

#[tokio::test]
async fn test_apply_all_passes_failed_leaves_group() {
    let env = TestEnv::new();
    env.summarizer.fail_all();
    let memory = task_memory("only", "T1", 1);
    env.put(&memory).await;

    let result = env.engine().apply(&wm_rule(), &[memory.clone()]).await;
    assert!(matches!(result, Err(MemoryError::TransientPort(_))));

    assert_eq!(env.store.len().await, 1);
    assert!(env.store.get(&memory.id).await.unwrap().unwrap().is_active());
}

#[tokio::test]
async fn test_apply_without_embedder_still_commits() {
    let env = TestEnv::new();
    env.embedder.set_failing(true);
    let memory = task_memory("only", "T1", 1);
    env.put(&memory).await;

    let result = env.engine().apply(&wm_rule(), &[memory]).await.unwrap();
    assert!(result.new_memory.embeddings.is_none());
    assert!(env.store.get(&result.new_memory.id).await.unwrap().is_some());
}

// cycle

#[tokio::test]
async fn test_cycle_groups_shared_task() {
    let env = TestEnv::new();
    let a = task_memory("first", "T1", 1);
    let b = task_memory("second", "T1", 1);
    let loner = aged_memory(MemoryLevel::WorkingMemory, "unrelated", 1);
    for memory in [&a, &b, &loner] {
        env.put(memory).await;
    }

    let report = env.cycle().run().await;
    assert_eq!(report.groups_consolidated, 2);
    assert_eq!(report.memories_consolidated, 3);
    assert!(!report.interrupted);

    let short_term = env.store.list_by_level(MemoryLevel::ShortTerm, Some(TEST_OWNER)).await.unwrap();
    assert_eq!(short_term.len(), 2);
    let pair = short_term
        .iter()
        .find(|m| m.metadata.related_memories.len() == 2)
        .unwrap();
    assert!(pair.metadata.related_memories.contains(&a.id));
    assert!(pair.metadata.related_memories.contains(&b.id));
    assert_eq!(pair.metadata.task_id.as_deref(), Some("T1"));
}

#[tokio::test]
async fn test_cycle_respects_min_age() {
    let env = TestEnv::new();
    env.put(&memory_at(MemoryLevel::WorkingMemory, "just now")).await;

    let report = env.cycle().run().await;
    assert_eq!(report.groups_consolidated, 0);
    assert!(env.store.list_by_level(MemoryLevel::ShortTerm, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cycle_second_run_is_noop() {
    let env = TestEnv::new();
    env.put(&task_memory("first", "T1", 1)).await;
    env.put(&task_memory("second", "T1", 1)).await;

    let cycle = env.cycle();
    assert_eq!(cycle.run().await.groups_consolidated, 1);
    assert_eq!(cycle.run().await.groups_consolidated, 0);
    assert_eq!(env.store.len().await, 3);
}

#[tokio::test]
async fn test_cycle_without_combine_uses_singletons() {
    let rule = wm_rule().with_transformations(Transformations {
        summarize: true,
        ..Default::default()
    });
    let env = TestEnv::new().with_rules(vec![rule]);
    env.put(&task_memory("first", "T1", 1)).await;
    env.put(&task_memory("second", "T1", 1)).await;

    let report = env.cycle().run().await;
    assert_eq!(report.groups_consolidated, 2);
    let short_term = env.store.list_by_level(MemoryLevel::ShortTerm, None).await.unwrap();
    assert!(short_term.iter().all(|m| m.metadata.related_memories.len() == 1));
}

#[tokio::test]
async fn test_cycle_skips_groups_below_long_term_floor() {
    let rule = ConsolidationRule::new(MemoryLevel::ShortTerm, MemoryLevel::LongTerm);
    let env = TestEnv::new().with_rules(vec![rule]);
    let low = aged_memory(MemoryLevel::ShortTerm, "low", 2);
    let mut high = aged_memory(MemoryLevel::ShortTerm, "high", 2);
    high.importance = Importance::High;
    env.put(&low).await;
    env.put(&high).await;

    let report = env.cycle().run().await;
    assert_eq!(report.groups_skipped, 1);
    assert_eq!(report.groups_consolidated, 1);
    assert!(env.store.get(&low.id).await.unwrap().unwrap().is_active());

    let long_term = env.store.list_by_level(MemoryLevel::LongTerm, None).await.unwrap();
    assert_eq!(long_term.len(), 1);
    assert_eq!(long_term[0].importance, Importance::High);
}

#[tokio::test]
async fn test_cycle_isolates_owners() {
    let env = TestEnv::new();
    let mut a = task_memory("mine", "T1", 1);
    let mut b = task_memory("theirs", "T1", 1);
    a.metadata.owner_agent_id = "agent-a".to_string();
    b.metadata.owner_agent_id = "agent-b".to_string();
    env.put(&a).await;
    env.put(&b).await;

    let report = env.cycle().run().await;
    assert_eq!(report.groups_consolidated, 2);
    for owner in ["agent-a", "agent-b"] {
        let short_term = env.store.list_by_level(MemoryLevel::ShortTerm, Some(owner)).await.unwrap();
        assert_eq!(short_term.len(), 1);
        assert_eq!(short_term[0].metadata.related_memories.len(), 1);
    }
}

#[tokio::test]
async fn test_cycle_failure_leaves_group_for_next_cycle() {
    let env = TestEnv::new();
    env.summarizer.fail_all();
    let memory = task_memory("retry me", "T1", 1);
    env.put(&memory).await;

    let cycle = env.cycle();
    let report = cycle.run().await;
    assert_eq!(report.groups_failed, 1);
    assert!(env.store.get(&memory.id).await.unwrap().unwrap().is_active());

    env.summarizer.recover();
    let report = cycle.run().await;
    assert_eq!(report.groups_consolidated, 1);
    assert!(env.store.get(&memory.id).await.unwrap().unwrap().is_consolidated());
}

#[tokio::test]
async fn test_cycle_repairs_missing_embeddings() {
    let env = TestEnv::new();
    let memory = memory_at(MemoryLevel::WorkingMemory, "no vector");
    env.put(&memory).await;

    let report = env.cycle().run().await;
    assert_eq!(report.embeddings_repaired, 1);
    assert!(env.store.get(&memory.id).await.unwrap().unwrap().embeddings.is_some());
}

#[tokio::test]
async fn test_cycle_honours_stop_flag() {
    let env = TestEnv::new();
    env.put(&task_memory("first", "T1", 1)).await;

    let report = env.cycle().run_until(&AtomicBool::new(true)).await;
    assert!(report.interrupted);
    assert_eq!(report.rules_evaluated, 0);
    assert_eq!(report.groups_consolidated, 0);
}

#[tokio::test]
async fn test_expired_memory_consolidated_despite_thresholds() {
    let rule = wm_rule().with_conditions(RuleConditions {
        min_importance: Importance::Critical,
        ..Default::default()
    });
    let env = TestEnv::new().with_rules(vec![rule]);
    let expired = aged_memory(MemoryLevel::WorkingMemory, "stale", 30);
    let fresh = aged_memory(MemoryLevel::WorkingMemory, "fresh", 1);
    env.put(&expired).await;
    env.put(&fresh).await;

    env.cycle().run().await;
    assert!(env.store.get(&expired.id).await.unwrap().unwrap().is_consolidated());
    assert!(env.store.get(&fresh.id).await.unwrap().unwrap().is_active());
}
