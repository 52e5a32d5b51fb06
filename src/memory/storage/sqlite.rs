use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use super::{rank, MemoryStore, SearchRequest, StorageError};
use super::super::{Importance, Memory, MemoryLevel, MemoryMetadata, CONSOLIDATED_TAG};

type MemoryRow = (String, String, String, i64, DateTime<Utc>, DateTime<Utc>, i64, Option<String>, String);

const SELECT_COLUMNS: &str =
    "SELECT id, content, level, importance, created_at, last_accessed, access_count, embeddings, metadata FROM memories";

/// SQLite-backed store; similarity is computed in-process over the scoped rows
pub struct SqliteMemoryStore {
    pool: SqlitePool,
}

impl SqliteMemoryStore {
    pub async fn new(database_path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", database_path))
            .map_err(|e| StorageError::ConfigError(e.to_string()))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::ConnectionError(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                level TEXT NOT NULL,
                importance INTEGER NOT NULL,
                created_at DATETIME NOT NULL,
                last_accessed DATETIME NOT NULL,
                access_count INTEGER NOT NULL,
                embeddings TEXT,
                metadata TEXT NOT NULL,
                owner_agent_id TEXT NOT NULL,
                project_id TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_owner_level ON memories(owner_agent_id, level)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_memories_created_at ON memories(created_at)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    fn decode(row: MemoryRow) -> Result<Memory, StorageError> {
        let (id, content, level, importance, created_at, last_accessed, access_count, embeddings, metadata) = row;
        let level = MemoryLevel::from_str(&level).map_err(StorageError::DatabaseError)?;
        let importance = Importance::from_i64(importance)
            .ok_or_else(|| StorageError::DatabaseError(format!("invalid importance {} on {}", importance, id)))?;
        let embeddings = match embeddings {
            Some(json) => Some(serde_json::from_str::<Vec<f32>>(&json)?),
            None => None,
        };
        let metadata: MemoryMetadata = serde_json::from_str(&metadata)?;

        Ok(Memory {
            id,
            content,
            level,
            importance,
            created_at,
            last_accessed,
            access_count: access_count.max(1) as u64,
            embeddings,
            metadata,
        })
    }

    fn decode_all(rows: Vec<MemoryRow>) -> Result<Vec<Memory>, StorageError> {
        rows.into_iter().map(Self::decode).collect()
    }

    async fn insert<'e, E>(executor: E, memory: &Memory) -> Result<(), StorageError>
    where
        E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
    {
        let embeddings = memory.embeddings.as_ref().map(serde_json::to_string).transpose()?;
        let metadata = serde_json::to_string(&memory.metadata)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO memories
            (id, content, level, importance, created_at, last_accessed, access_count, embeddings, metadata, owner_agent_id, project_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(memory.id.clone())
        .bind(memory.content.clone())
        .bind(memory.level.as_str())
        .bind(memory.importance.as_i64())
        .bind(memory.created_at)
        .bind(memory.last_accessed)
        .bind(memory.access_count as i64)
        .bind(embeddings)
        .bind(metadata)
        .bind(memory.metadata.owner_agent_id.clone())
        .bind(memory.metadata.project_id.clone())
        .execute(executor)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl MemoryStore for SqliteMemoryStore {
    async fn put(&self, memory: &Memory) -> Result<(), StorageError> {
        Self::insert(&self.pool, memory).await
    }

    async fn get(&self, id: &str) -> Result<Option<Memory>, StorageError> {
        let row = sqlx::query_as::<_, MemoryRow>(&format!("{} WHERE id = ?", SELECT_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::decode).transpose()
    }

    async fn search(&self, request: &SearchRequest, limit: usize) -> Result<Vec<(Memory, f32)>, StorageError> {
        let rows = match &request.owner_agent_id {
            Some(owner) => {
                sqlx::query_as::<_, MemoryRow>(&format!(
                    "{} WHERE project_id = ? AND owner_agent_id = ?",
                    SELECT_COLUMNS
                ))
                .bind(&request.project_id)
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, MemoryRow>(&format!("{} WHERE project_id = ?", SELECT_COLUMNS))
                    .bind(&request.project_id)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let scored = Self::decode_all(rows)?
            .into_iter()
            .map(|memory| {
                let score = request.score(&memory);
                (memory, score)
            })
            .collect();
        Ok(rank(scored, limit))
    }

    async fn list_by_level(&self, level: MemoryLevel, owner_agent_id: Option<&str>) -> Result<Vec<Memory>, StorageError> {
        let rows = match owner_agent_id {
            Some(owner) => {
                sqlx::query_as::<_, MemoryRow>(&format!(
                    "{} WHERE level = ? AND owner_agent_id = ? ORDER BY created_at ASC, id ASC",
                    SELECT_COLUMNS
                ))
                .bind(level.as_str())
                .bind(owner)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, MemoryRow>(&format!(
                    "{} WHERE level = ? ORDER BY created_at ASC, id ASC",
                    SELECT_COLUMNS
                ))
                .bind(level.as_str())
                .fetch_all(&self.pool)
                .await?
            }
        };
        Self::decode_all(rows)
    }

    async fn list_by_owner(&self, owner_agent_id: &str) -> Result<Vec<Memory>, StorageError> {
        let rows = sqlx::query_as::<_, MemoryRow>(&format!(
            "{} WHERE owner_agent_id = ? ORDER BY created_at ASC, id ASC",
            SELECT_COLUMNS
        ))
        .bind(owner_agent_id)
        .fetch_all(&self.pool)
        .await?;
        Self::decode_all(rows)
    }

    async fn record_access(&self, id: &str, at: DateTime<Utc>) -> Result<Option<Memory>, StorageError> {
        let result = sqlx::query(
            "UPDATE memories SET access_count = access_count + 1, \
             last_accessed = CASE WHEN last_accessed < ? THEN ? ELSE last_accessed END \
             WHERE id = ?",
        )
        .bind(at)
        .bind(at)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.get(id).await
    }

    async fn set_embeddings(&self, id: &str, embeddings: &[f32]) -> Result<(), StorageError> {
        let json = serde_json::to_string(embeddings)?;
        let result = sqlx::query("UPDATE memories SET embeddings = ? WHERE id = ?")
            .bind(json)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn commit_consolidation(&self, consolidated: &Memory, source_ids: &[String]) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;

        Self::insert(&mut *tx, consolidated).await?;

        for id in source_ids {
            let metadata: Option<(String,)> = sqlx::query_as("SELECT metadata FROM memories WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
            // dropping `tx` on the error path rolls the whole group back
            let (metadata_json,) = metadata.ok_or_else(|| StorageError::NotFound(id.clone()))?;
            let mut metadata: MemoryMetadata = serde_json::from_str(&metadata_json)?;
            metadata.tags.insert(CONSOLIDATED_TAG.to_string());

            sqlx::query("UPDATE memories SET metadata = ? WHERE id = ?")
                .bind(serde_json::to_string(&metadata)?)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
