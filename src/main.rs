use merco_memory::logging::init_logging;
use merco_memory::{Importance, MemoryConfig, MemoryLevel, MemoryManager, MemoryMetadata, MemoryQuery};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging("info,merco_memory=debug");

    // picks providers from the environment; falls back to offline ones without OPENAI_API_KEY
    let config = MemoryConfig::from_env();
    println!("Embedding: {:?}, summarization: {:?}, storage: {:?}", config.embedding, config.summarization, config.storage);

    let manager = MemoryManager::from_config(config).await?;

    let metadata = |task: &str| MemoryMetadata::new("demo", "observation", "demo-agent", "demo-project").with_task(task);

    manager.add_memory("Ran the database migrations on staging.", metadata("deploy")).await?;
    manager.add_memory("Schema drift found in the orders table.", metadata("deploy")).await?;
    manager
        .add_memory_with(
            "The team prefers blue-green deployments.",
            metadata("process"),
            MemoryLevel::WorkingMemory,
            Importance::High,
        )
        .await?;

    let report = manager.run_consolidation_cycle().await;
    println!("Cycle: {:?}", report);

    let results = manager
        .query_memories(&MemoryQuery::new("deployment issues", "demo-project").with_limit(5))
        .await?;
    for result in &results {
        println!("[{:.2}] {} ({})", result.similarity, result.memory.content, result.memory.level);
    }

    let stats = manager.get_stats("demo-agent").await?;
    println!("Stats: {} memories, retention {:.2}", stats.total_memories, stats.retention_rate);

    manager.stop().await;
    Ok(())
}
