//! JSON file storage implementation.
//!
//! Stores one JSON file per record under a data directory:
//!
//! ```text
//! <root>/paths/<path>.json
//! <root>/modules/<module>.json
//! <root>/progress/<learner>/<module>.json
//! <root>/path_progress/<learner>/<path>.json
//! ```
//!
//! Writes go through a single mutex so read-modify-write updates (attempt
//! counters) are atomic within one process, and land via a temp file rename
//! so readers never observe a partial record.

use std::path::{Path, PathBuf};
use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;
use trainpath_core::{
    LearnerId, Module, ModuleId, PathId, PathProgressRecord, ProgressRecord, ProgressUpdate,
    Time, TrainingPath,
};

use super::trait_::{
    modules_in_order, paths_in_order, Catalog, ChangeFeed, ModuleCatalog, PathProgressStore,
    ProgressStore, ProgressSubscription, Result,
};

/// File-based JSON storage backend.
pub struct JsonStorage {
    root: PathBuf,
    write_lock: Mutex<()>,
    feed: ChangeFeed,
    push: bool,
}

impl JsonStorage {
    /// Open (and create if needed) a data directory.
    pub async fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        fs::create_dir_all(root.join("paths")).await?;
        fs::create_dir_all(root.join("modules")).await?;
        fs::create_dir_all(root.join("progress")).await?;
        fs::create_dir_all(root.join("path_progress")).await?;

        Ok(Self {
            root,
            write_lock: Mutex::new(()),
            feed: ChangeFeed::default(),
            push: true,
        })
    }

    /// Stop offering change subscriptions.
    ///
    /// The feed only sees writes made through this handle, so watchers of a
    /// directory shared with other processes must poll instead.
    pub fn without_change_feed(mut self) -> Self {
        self.push = false;
        self
    }

    /// Root data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_file(&self, id: PathId) -> PathBuf {
        self.root.join("paths").join(format!("{}.json", id))
    }
    fn module_file(&self, id: ModuleId) -> PathBuf {
        self.root.join("modules").join(format!("{}.json", id))
    }
    fn progress_file(&self, learner_id: &LearnerId, module_id: ModuleId) -> PathBuf {
        self.root
            .join("progress")
            .join(learner_dir_name(learner_id))
            .join(format!("{}.json", module_id))
    }
    fn path_progress_file(&self, learner_id: &LearnerId, path_id: PathId) -> PathBuf {
        self.root
            .join("path_progress")
            .join(learner_dir_name(learner_id))
            .join(format!("{}.json", path_id))
    }

    /// Add or replace a path.
    pub async fn save_path(&self, path: &TrainingPath) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.path_file(path.id), path).await
    }

    /// Add or replace a module.
    pub async fn save_module(&self, module: &Module) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        write_json(&self.module_file(module.id), module).await
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
        debug!(
            "Imported {} paths and {} modules into {}",
            catalog.paths.len(),
            catalog.modules.len(),
            self.root.display()
        );
        Ok(())
    }
}

#[async_trait]
impl ModuleCatalog for JsonStorage {
    async fn list_modules_for_path(&self, path_id: PathId) -> Result<Vec<Module>> {
        let all: Vec<Module> = list_dir(&self.root.join("modules")).await?;
        Ok(modules_in_order(&all, path_id))
    }

    async fn load_module(&self, id: ModuleId) -> Result<Option<Module>> {
        read_json(&self.module_file(id)).await
    }

    async fn load_path(&self, id: PathId) -> Result<Option<TrainingPath>> {
        read_json(&self.path_file(id)).await
    }

    async fn list_paths(&self) -> Result<Vec<TrainingPath>> {
        let all: Vec<TrainingPath> = list_dir(&self.root.join("paths")).await?;
        Ok(paths_in_order(&all))
    }
}

#[async_trait]
impl ProgressStore for JsonStorage {
    async fn get_progress(
        &self,
        learner_id: &LearnerId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<ProgressRecord>> {
        let mut records = Vec::with_capacity(module_ids.len());
        for id in module_ids {
            if let Some(record) = read_json(&self.progress_file(learner_id, *id)).await? {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn upsert_progress(
        &self,
        learner_id: &LearnerId,
        module_id: ModuleId,
        update: ProgressUpdate,
    ) -> Result<ProgressRecord> {
        let record = {
            let _guard = self.write_lock.lock().await;
            let file = self.progress_file(learner_id, module_id);
            let now = chrono::Utc::now();
            let mut record = read_json::<ProgressRecord>(&file)
                .await?
                .unwrap_or_else(|| ProgressRecord::new(learner_id.clone(), module_id, now));
            record.apply(&update, now);
            write_json(&file, &record).await?;
            record
        };
        self.feed.publish(&record);
        Ok(record)
    }

    fn subscribe(&self, learner_id: &LearnerId) -> Option<ProgressSubscription> {
        self.push.then(|| self.feed.subscribe(learner_id))
    }
}

#[async_trait]
impl PathProgressStore for JsonStorage {
    async fn get_path_progress(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
    ) -> Result<Option<PathProgressRecord>> {
        read_json(&self.path_progress_file(learner_id, path_id)).await
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
        let _guard = self.write_lock.lock().await;
        let file = self.path_progress_file(learner_id, path_id);
        let mut record = read_json::<PathProgressRecord>(&file)
            .await?
            .unwrap_or_else(|| PathProgressRecord::new(learner_id.clone(), path_id, at));
        if !record.accepts_attempt(max_attempts) {
            return Ok(None);
        }
        record.record_attempt(score, passed, at);
        write_json(&file, &record).await?;
        Ok(Some(record))
    }
}

/// Learner IDs come from the auth service; escape anything that is not
/// filename safe.
fn learner_dir_name(learner_id: &LearnerId) -> String {
    let mut out = String::with_capacity(learner_id.as_str().len());
    for byte in learner_id.as_str().bytes() {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'_' => out.push(byte as char),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

async fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json.as_bytes()).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

async fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path).await {
        Ok(json) => {
            let value = serde_json::from_str(&json)?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn list_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut items = Vec::new();
    let mut rd = fs::read_dir(dir).await?;
    while let Some(entry) = rd.next_entry().await? {
        if entry.path().extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Some(item) = read_json(&entry.path()).await? {
            items.push(item);
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainpath_core::ProgressStatus;

    #[tokio::test]
    async fn test_progress_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let learner = LearnerId::new("emp-7");
        let module = ModuleId::new();

        {
            let storage = JsonStorage::new(dir.path()).await.unwrap();
            storage
                .upsert_progress(&learner, module, ProgressUpdate {
                    status: ProgressStatus::Completed,
                    score: Some(90),
                    attempts_delta: 1,
                    completed_at: None,
                    keep_completed: false,
                })
                .await
                .unwrap();
        }

        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let records = storage.get_progress(&learner, &[module, ModuleId::new()]).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, ProgressStatus::Completed);
        assert_eq!(records[0].score, Some(90));
        assert!(records[0].completed_at.is_some());
    }

    #[tokio::test]
    async fn test_import_and_list_catalog() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();

        let path = TrainingPath::new("Customer service");
        let catalog = Catalog {
            modules: vec![Module::new(path.id, "Escalations", 1), Module::new(path.id, "Greeting", 0)],
            paths: vec![path.clone()],
        };
        storage.import_catalog(&catalog).await.unwrap();

        let modules = storage.list_modules_for_path(path.id).await.unwrap();
        assert_eq!(modules[0].title, "Greeting");
        assert_eq!(modules[1].title, "Escalations");
        assert_eq!(storage.list_paths().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_capstone_attempts_accumulate() {
        let dir = tempfile::tempdir().unwrap();
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        let learner = LearnerId::new("emp-7");
        let path = PathId::new();
        let now = chrono::Utc::now();

        storage.record_capstone_attempt(&learner, path, 50, false, 3, now).await.unwrap();
        let record = storage
            .record_capstone_attempt(&learner, path, 80, true, 3, now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.attempts, 2);
        assert_eq!(record.best_score, Some(80));
        assert_eq!(record.status, ProgressStatus::Completed);

        // Passed paths take no further attempts.
        let refused = storage.record_capstone_attempt(&learner, path, 100, true, 3, now).await.unwrap();
        assert!(refused.is_none());
    }

    #[tokio::test]
    async fn test_capstone_attempt_limit_is_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let learner = LearnerId::new("emp-7");
        let path = PathId::new();
        let now = chrono::Utc::now();
        {
            let storage = JsonStorage::new(dir.path()).await.unwrap();
            assert!(storage.record_capstone_attempt(&learner, path, 10, false, 1, now).await.unwrap().is_some());
        }

        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert!(storage.record_capstone_attempt(&learner, path, 90, true, 1, now).await.unwrap().is_none());
        let record = storage.get_path_progress(&learner, path).await.unwrap().unwrap();
        assert_eq!(record.attempts, 1);
        assert_eq!(record.status, ProgressStatus::InProgress);
    }

    #[tokio::test]
    async fn test_change_feed_can_be_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let learner = LearnerId::new("emp-7");
        let storage = JsonStorage::new(dir.path()).await.unwrap();
        assert!(storage.subscribe(&learner).is_some());

        let storage = storage.without_change_feed();
        assert!(storage.subscribe(&learner).is_none());
    }

    #[test]
    fn test_learner_dir_name_escapes_separators() {
        assert_eq!(learner_dir_name(&LearnerId::new("a/b")), "a%2Fb");
        assert_eq!(learner_dir_name(&LearnerId::new("..")), "%2E%2E");
        assert_eq!(learner_dir_name(&LearnerId::new("emp_1-x")), "emp_1-x");
    }
}
