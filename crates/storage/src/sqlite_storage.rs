//! SQLite storage backend.
//!
//! Catalog entities are stored as JSON documents; progress rows are real
//! columns so attempt counters can be incremented inside the upsert itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use tracing::debug;
use trainpath_core::{
    LearnerId, Module, ModuleId, PathId, PathProgressRecord, ProgressRecord, ProgressStatus,
    ProgressUpdate, Time, TrainingPath,
};

use super::trait_::{
    modules_in_order, paths_in_order, Catalog, ChangeFeed, ModuleCatalog, PathProgressStore,
    ProgressStore, ProgressSubscription, Result, StorageError,
};

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStorage {
    /// Database connection pool
    pool: SqlitePool,
    feed: ChangeFeed,
}

impl SqliteStorage {
    /// Connect to `db_url` (e.g. `sqlite://trainpath.db?mode=rwc`).
    pub async fn new(db_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(db_url).await.map_err(db_err)?;
        let storage = Self { pool, feed: ChangeFeed::default() };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create an in-memory database for testing.
    ///
    /// Every pooled connection to `:memory:` would get its own database, so
    /// the pool is pinned to a single connection.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_err)?;
        let storage = Self { pool, feed: ChangeFeed::default() };
        storage.init_schema().await?;
        Ok(storage)
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (
                id TEXT PRIMARY KEY,
                entity_type TEXT NOT NULL,
                data TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS progress (
                learner_id TEXT NOT NULL,
                module_id TEXT NOT NULL,
                status TEXT NOT NULL,
                score INTEGER,
                attempts INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (learner_id, module_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS path_progress (
                learner_id TEXT NOT NULL,
                path_id TEXT NOT NULL,
                status TEXT NOT NULL,
                best_score INTEGER,
                attempts INTEGER NOT NULL DEFAULT 0,
                completed_at TEXT,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (learner_id, path_id)
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type)")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn save_entity(&self, id: String, entity_type: &str, data: String) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO entities (id, entity_type, data, updated_at)
            VALUES (?, ?, ?, ?)",
        )
        .bind(id)
        .bind(entity_type)
        .bind(data)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn load_entity<T: serde::de::DeserializeOwned>(
        &self,
        id: String,
        entity_type: &str,
    ) -> Result<Option<T>> {
        let row = sqlx::query("SELECT data FROM entities WHERE id = ? AND entity_type = ?")
            .bind(id)
            .bind(entity_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        match row {
            Some(row) => {
                let data: String = row.try_get("data").map_err(db_err)?;
                Ok(Some(serde_json::from_str(&data)?))
            }
            None => Ok(None),
        }
    }

    async fn list_entities<T: serde::de::DeserializeOwned>(&self, entity_type: &str) -> Result<Vec<T>> {
        let rows = sqlx::query("SELECT data FROM entities WHERE entity_type = ?")
            .bind(entity_type)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        rows.iter()
            .map(|row| {
                let data: String = row.try_get("data").map_err(db_err)?;
                Ok(serde_json::from_str(&data)?)
            })
            .collect()
    }

    /// Add or replace a path.
    pub async fn save_path(&self, path: &TrainingPath) -> Result<()> {
        self.save_entity(path.id.to_string(), "path", serde_json::to_string(path)?).await
    }

    /// Add or replace a module.
    pub async fn save_module(&self, module: &Module) -> Result<()> {
        self.save_entity(module.id.to_string(), "module", serde_json::to_string(module)?).await
    }

    /// Validate and write every path and module of `catalog`.
    pub async fn import_catalog(&self, catalog: &Catalog) -> Result<()> {
        catalog.validate()?;
        for path in &catalog.paths {
            self.save_path(path).await?;
        }
        for module in &catalog.modules {
            self.save_module(module).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ModuleCatalog for SqliteStorage {
    async fn list_modules_for_path(&self, path_id: PathId) -> Result<Vec<Module>> {
        let all: Vec<Module> = self.list_entities("module").await?;
        Ok(modules_in_order(&all, path_id))
    }

    async fn load_module(&self, id: ModuleId) -> Result<Option<Module>> {
        self.load_entity(id.to_string(), "module").await
    }

    async fn load_path(&self, id: PathId) -> Result<Option<TrainingPath>> {
        self.load_entity(id.to_string(), "path").await
    }

    async fn list_paths(&self) -> Result<Vec<TrainingPath>> {
        let all: Vec<TrainingPath> = self.list_entities("path").await?;
        Ok(paths_in_order(&all))
    }
}

#[async_trait]
impl ProgressStore for SqliteStorage {
    async fn get_progress(
        &self,
        learner_id: &LearnerId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<ProgressRecord>> {
        if module_ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = vec!["?"; module_ids.len()].join(", ");
        let sql = format!(
            "SELECT * FROM progress WHERE learner_id = ? AND module_id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(learner_id.as_str());
        for id in module_ids {
            query = query.bind(id.to_string());
        }
        let rows = query.fetch_all(&self.pool).await.map_err(db_err)?;
        rows.iter().map(progress_from_row).collect()
    }

    async fn upsert_progress(
        &self,
        learner_id: &LearnerId,
        module_id: ModuleId,
        update: ProgressUpdate,
    ) -> Result<ProgressRecord> {
        let now = Utc::now();
        let insert_completed_at = match update.status {
            ProgressStatus::Completed => update.completed_at.or(Some(now)),
            _ => None,
        };

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        sqlx::query(
            "INSERT INTO progress (learner_id, module_id, status, score, attempts, completed_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (learner_id, module_id) DO UPDATE SET
                status = CASE WHEN ?9 AND progress.status = 'completed'
                    THEN 'completed' ELSE excluded.status END,
                score = CASE WHEN ?9 AND progress.status = 'completed' AND excluded.score IS NOT NULL
                    THEN MAX(COALESCE(progress.score, 0), excluded.score)
                    ELSE COALESCE(excluded.score, progress.score) END,
                attempts = progress.attempts + excluded.attempts,
                completed_at = CASE
                    WHEN ?9 AND progress.status = 'completed'
                        THEN COALESCE(progress.completed_at, ?8, excluded.updated_at)
                    WHEN excluded.status = 'completed'
                        THEN COALESCE(?8, progress.completed_at, excluded.updated_at)
                    ELSE NULL END,
                updated_at = excluded.updated_at",
        )
        .bind(learner_id.as_str())
        .bind(module_id.to_string())
        .bind(update.status.as_str())
        .bind(update.score.map(i64::from))
        .bind(i64::from(update.attempts_delta))
        .bind(insert_completed_at)
        .bind(now)
        .bind(update.completed_at)
        .bind(update.keep_completed)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        let row = sqlx::query("SELECT * FROM progress WHERE learner_id = ? AND module_id = ?")
            .bind(learner_id.as_str())
            .bind(module_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        let record = progress_from_row(&row)?;
        debug!(learner = %learner_id, module = %module_id, status = %record.status, "progress upserted");
        self.feed.publish(&record);
        Ok(record)
    }

    fn subscribe(&self, learner_id: &LearnerId) -> Option<ProgressSubscription> {
        Some(self.feed.subscribe(learner_id))
    }
}

#[async_trait]
impl PathProgressStore for SqliteStorage {
    async fn get_path_progress(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
    ) -> Result<Option<PathProgressRecord>> {
        let row = sqlx::query("SELECT * FROM path_progress WHERE learner_id = ? AND path_id = ?")
            .bind(learner_id.as_str())
            .bind(path_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.as_ref().map(path_progress_from_row).transpose()
    }

    async fn record_capstone_attempt(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
        score: u8,
        passed: bool,
        max_attempts: u32,
        at: Time,
    ) -> Result<Option<PathProgressRecord>> {
        if max_attempts == 0 {
            return Ok(None);
        }
        let status = if passed { ProgressStatus::Completed } else { ProgressStatus::InProgress };

        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let written = sqlx::query(
            "INSERT INTO path_progress (learner_id, path_id, status, best_score, attempts, completed_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 1, ?5, ?6)
            ON CONFLICT (learner_id, path_id) DO UPDATE SET
                attempts = path_progress.attempts + 1,
                best_score = MAX(COALESCE(path_progress.best_score, 0), excluded.best_score),
                status = excluded.status,
                completed_at = excluded.completed_at,
                updated_at = excluded.updated_at
            WHERE path_progress.status != 'completed' AND path_progress.attempts < ?7",
        )
        .bind(learner_id.as_str())
        .bind(path_id.to_string())
        .bind(status.as_str())
        .bind(i64::from(score))
        .bind(if passed { Some(at) } else { None })
        .bind(at)
        .bind(i64::from(max_attempts))
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;
        if written.rows_affected() == 0 {
            debug!(learner = %learner_id, path = %path_id, "capstone attempt refused");
            return Ok(None);
        }

        let row = sqlx::query("SELECT * FROM path_progress WHERE learner_id = ? AND path_id = ?")
            .bind(learner_id.as_str())
            .bind(path_id.to_string())
            .fetch_one(&mut *tx)
            .await
            .map_err(db_err)?;
        tx.commit().await.map_err(db_err)?;

        path_progress_from_row(&row).map(Some)
    }
}

fn db_err(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            StorageError::Unavailable(e.to_string())
        }
        other => StorageError::Other(other.to_string()),
    }
}

fn parse_status(raw: &str) -> Result<ProgressStatus> {
    raw.parse().map_err(StorageError::Invalid)
}

fn to_u8(value: i64, column: &str) -> Result<u8> {
    u8::try_from(value).map_err(|_| StorageError::Invalid(format!("{column} out of range: {value}")))
}

fn progress_from_row(row: &SqliteRow) -> Result<ProgressRecord> {
    let module_id: String = row.try_get("module_id").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    let score: Option<i64> = row.try_get("score").map_err(db_err)?;
    let attempts: i64 = row.try_get("attempts").map_err(db_err)?;
    Ok(ProgressRecord {
        learner_id: LearnerId::new(row.try_get::<String, _>("learner_id").map_err(db_err)?),
        module_id: module_id
            .parse()
            .map_err(|_| StorageError::Invalid(format!("bad module id: {module_id}")))?,
        status: parse_status(&status)?,
        score: score.map(|s| to_u8(s, "score")).transpose()?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at").map_err(db_err)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(db_err)?,
    })
}

fn path_progress_from_row(row: &SqliteRow) -> Result<PathProgressRecord> {
    let path_id: String = row.try_get("path_id").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;
    let best_score: Option<i64> = row.try_get("best_score").map_err(db_err)?;
    let attempts: i64 = row.try_get("attempts").map_err(db_err)?;
    Ok(PathProgressRecord {
        learner_id: LearnerId::new(row.try_get::<String, _>("learner_id").map_err(db_err)?),
        path_id: path_id
            .parse()
            .map_err(|_| StorageError::Invalid(format!("bad path id: {path_id}")))?,
        status: parse_status(&status)?,
        best_score: best_score.map(|s| to_u8(s, "best_score")).transpose()?,
        attempts: u32::try_from(attempts).unwrap_or(u32::MAX),
        completed_at: row.try_get::<Option<DateTime<Utc>>, _>("completed_at").map_err(db_err)?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at").map_err(db_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_increments_in_database() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let learner = LearnerId::new("emp-1");
        let module = ModuleId::new();

        let failed = ProgressUpdate {
            status: ProgressStatus::InProgress,
            score: Some(50),
            attempts_delta: 1,
            completed_at: None,
            keep_completed: false,
        };
        storage.upsert_progress(&learner, module, failed).await.unwrap();
        let passed = ProgressUpdate {
            status: ProgressStatus::Completed,
            score: Some(90),
            attempts_delta: 1,
            completed_at: Some(Utc::now()),
            keep_completed: false,
        };
        let record = storage.upsert_progress(&learner, module, passed).await.unwrap();

        assert_eq!(record.attempts, 2);
        assert_eq!(record.score, Some(90));
        assert_eq!(record.status, ProgressStatus::Completed);
        assert!(record.completed_at.is_some());

        let reset = storage
            .upsert_progress(&learner, module, ProgressUpdate::status(ProgressStatus::NotStarted))
            .await
            .unwrap();
        assert!(reset.completed_at.is_none());
        assert_eq!(reset.score, Some(90));
    }

    #[tokio::test]
    async fn test_catalog_round_trip() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let path = TrainingPath::new("Compliance");
        storage
            .import_catalog(&Catalog {
                modules: vec![Module::new(path.id, "GDPR", 1), Module::new(path.id, "Ethics", 0)],
                paths: vec![path.clone()],
            })
            .await
            .unwrap();

        let modules = storage.list_modules_for_path(path.id).await.unwrap();
        assert_eq!(modules.iter().map(|m| m.title.as_str()).collect::<Vec<_>>(), ["Ethics", "GDPR"]);
        assert_eq!(storage.load_path(path.id).await.unwrap().unwrap().name, "Compliance");
    }

    #[tokio::test]
    async fn test_capstone_pass_is_sticky() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let learner = LearnerId::new("emp-1");
        let path = PathId::new();
        let now = Utc::now();

        storage.record_capstone_attempt(&learner, path, 30, false, 3, now).await.unwrap();
        let record = storage
            .record_capstone_attempt(&learner, path, 85, true, 3, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, ProgressStatus::Completed);
        assert_eq!(record.best_score, Some(85));
        assert_eq!(record.attempts, 2);

        let refused = storage.record_capstone_attempt(&learner, path, 40, false, 3, now).await.unwrap();
        assert!(refused.is_none());
        let stored = storage.get_path_progress(&learner, path).await.unwrap().unwrap();
        assert_eq!(stored.status, ProgressStatus::Completed);
        assert_eq!(stored.attempts, 2);
    }

    #[tokio::test]
    async fn test_capstone_attempt_limit_in_database() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let learner = LearnerId::new("emp-1");
        let path = PathId::new();
        let now = Utc::now();

        assert!(storage.record_capstone_attempt(&learner, path, 10, false, 0, now).await.unwrap().is_none());
        assert!(storage.record_capstone_attempt(&learner, path, 10, false, 2, now).await.unwrap().is_some());
        assert!(storage.record_capstone_attempt(&learner, path, 20, false, 2, now).await.unwrap().is_some());
        assert!(storage.record_capstone_attempt(&learner, path, 99, true, 2, now).await.unwrap().is_none());

        let stored = storage.get_path_progress(&learner, path).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 2);
        assert_eq!(stored.best_score, Some(20));
        assert_eq!(stored.status, ProgressStatus::InProgress);
    }

    #[tokio::test]
    async fn test_failing_retake_keeps_completion_in_database() {
        let storage = SqliteStorage::in_memory().await.unwrap();
        let learner = LearnerId::new("emp-1");
        let module = ModuleId::new();
        let passed_at = Utc::now();

        storage
            .upsert_progress(&learner, module, ProgressUpdate {
                score: Some(90),
                attempts_delta: 1,
                completed_at: Some(passed_at),
                ..ProgressUpdate::status(ProgressStatus::Completed)
            })
            .await
            .unwrap();
        let record = storage
            .upsert_progress(&learner, module, ProgressUpdate {
                score: Some(20),
                attempts_delta: 1,
                keep_completed: true,
                ..ProgressUpdate::status(ProgressStatus::InProgress)
            })
            .await
            .unwrap();

        assert_eq!(record.status, ProgressStatus::Completed);
        assert_eq!(record.score, Some(90));
        assert_eq!(record.attempts, 2);
        assert!(record.completed_at.is_some());
    }
}
