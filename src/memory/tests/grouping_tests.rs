use super::super::*;
use super::test_utils::*;
use std::collections::HashSet;

fn grouper() -> SimilarityGrouper {
    SimilarityGrouper::new(0.7)
}

fn with_embedding(content: &str, embedding: Vec<f32>) -> Memory {
    let mut memory = memory_at(MemoryLevel::WorkingMemory, content);
    memory.embeddings = Some(embedding);
    memory
}

#[test]
fn test_shared_task_is_related() {
    let mut a = memory_at(MemoryLevel::WorkingMemory, "a");
    let mut b = memory_at(MemoryLevel::WorkingMemory, "b");
    a.metadata.task_id = Some("T1".to_string());
    b.metadata.task_id = Some("T1".to_string());
    assert!(grouper().related(&a, &b));

    b.metadata.task_id = Some("T2".to_string());
    assert!(!grouper().related(&a, &b));
}

#[test]
fn test_explicit_reference_is_related() {
    let b = memory_at(MemoryLevel::WorkingMemory, "b");
    let mut a = memory_at(MemoryLevel::WorkingMemory, "a");
    a.metadata.related_memories.insert(b.id.clone());
    assert!(grouper().related(&a, &b));
}

#[test]
fn test_two_shared_tags_needed() {
    let mut a = memory_at(MemoryLevel::WorkingMemory, "a");
    let mut b = memory_at(MemoryLevel::WorkingMemory, "b");
    a.metadata.tags.extend(["rust".to_string(), "ci".to_string(), "x".to_string()]);
    b.metadata.tags.extend(["rust".to_string(), "y".to_string()]);
    assert!(!grouper().related(&a, &b));

    b.metadata.tags.insert("ci".to_string());
    assert!(grouper().related(&a, &b));
}

#[test]
fn test_embedding_threshold_inclusive() {
    let a = with_embedding("a", vec![1.0, 0.0]);
    let b = with_embedding("b", vec![1.0, 0.0]);
    let c = with_embedding("c", vec![0.0, 1.0]);
    assert!(grouper().related(&a, &b));
    assert!(!grouper().related(&a, &c));

    // missing embeddings never relate through similarity
    let d = memory_at(MemoryLevel::WorkingMemory, "d");
    assert!(!grouper().related(&a, &d));
}

#[test]
fn test_group_partitions_input() {
    let mut candidates = Vec::new();
    for i in 0..9 {
        let mut memory = with_embedding(&format!("m{}", i), one_hot(i % 3));
        if i == 4 {
            memory.metadata.task_id = Some("T9".to_string());
        }
        candidates.push(memory);
    }
    let input_ids: Vec<String> = candidates.iter().map(|m| m.id.clone()).collect();

    let groups = grouper().group(candidates);
    let output_ids: Vec<String> = groups.iter().flatten().map(|m| m.id.clone()).collect();

    assert_eq!(output_ids.len(), input_ids.len());
    let unique: HashSet<&String> = output_ids.iter().collect();
    assert_eq!(unique.len(), input_ids.len());
    assert!(input_ids.iter().all(|id| unique.contains(id)));
    assert_eq!(groups.len(), 3);
    assert!(groups.iter().all(|g| !g.is_empty()));
}

#[test]
fn test_group_keeps_founder_order() {
    let a = with_embedding("a", one_hot(0));
    let b = with_embedding("b", one_hot(1));
    let c = with_embedding("c", one_hot(0));
    let (a_id, b_id, c_id) = (a.id.clone(), b.id.clone(), c.id.clone());

    let groups = grouper().group(vec![a, b, c]);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].iter().map(|m| m.id.clone()).collect::<Vec<_>>(), vec![a_id, c_id]);
    assert_eq!(groups[1][0].id, b_id);
}

#[test]
fn test_grouping_is_not_transitive() {
    // a~b through a task, b~c through tags, a and c unrelated
    let mut a = memory_at(MemoryLevel::WorkingMemory, "a");
    let mut b = memory_at(MemoryLevel::WorkingMemory, "b");
    let mut c = memory_at(MemoryLevel::WorkingMemory, "c");
    a.metadata.task_id = Some("T1".to_string());
    b.metadata.task_id = Some("T1".to_string());
    b.metadata.tags.extend(["x".to_string(), "y".to_string()]);
    c.metadata.tags.extend(["x".to_string(), "y".to_string()]);
    let c_id = c.id.clone();

    let groups = grouper().group(vec![a, b, c]);
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].len(), 2);
    assert_eq!(groups[1][0].id, c_id);
}

#[test]
fn test_group_empty_input() {
    assert!(grouper().group(Vec::new()).is_empty());
}
