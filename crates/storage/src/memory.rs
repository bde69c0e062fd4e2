//! In-memory storage backend.
//!
//! Holds everything behind tokio locks. Used by tests and by embedders that
//! keep their own persistence.

use std::collections::HashMap;
use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use trainpath_core::{
    LearnerId, Module, ModuleId, PathId, PathProgressRecord, ProgressRecord, ProgressUpdate,
    Time, TrainingPath,
};

use super::trait_::{
    modules_in_order, paths_in_order, Catalog, ChangeFeed, ModuleCatalog, PathProgressStore,
    ProgressStore, ProgressSubscription, Result,
};

/// Storage kept entirely in memory.
#[derive(Default)]
pub struct MemoryStorage {
    paths: RwLock<HashMap<PathId, TrainingPath>>,
    modules: RwLock<HashMap<ModuleId, Module>>,
    progress: Mutex<HashMap<(LearnerId, ModuleId), ProgressRecord>>,
    path_progress: Mutex<HashMap<(LearnerId, PathId), PathProgressRecord>>,
    feed: ChangeFeed,
}

impl MemoryStorage {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `catalog`.
    pub async fn with_catalog(catalog: Catalog) -> Result<Self> {
        let storage = Self::new();
        storage.import_catalog(catalog).await?;
        Ok(storage)
    }

    /// Add or replace a path.
    pub async fn save_path(&self, path: TrainingPath) {
        self.paths.write().await.insert(path.id, path);
    }

    /// Add or replace a module.
    pub async fn save_module(&self, module: Module) {
        self.modules.write().await.insert(module.id, module);
    }

    /// Validate and load every path and module of `catalog`.
    pub async fn import_catalog(&self, catalog: Catalog) -> Result<()> {
        catalog.validate()?;
        for path in catalog.paths {
            self.save_path(path).await;
        }
        for module in catalog.modules {
            self.save_module(module).await;
        }
        Ok(())
    }
}

#[async_trait]
impl ModuleCatalog for MemoryStorage {
    async fn list_modules_for_path(&self, path_id: PathId) -> Result<Vec<Module>> {
        Ok(modules_in_order(self.modules.read().await.values(), path_id))
    }

    async fn load_module(&self, id: ModuleId) -> Result<Option<Module>> {
        Ok(self.modules.read().await.get(&id).cloned())
    }

    async fn load_path(&self, id: PathId) -> Result<Option<TrainingPath>> {
        Ok(self.paths.read().await.get(&id).cloned())
    }

    async fn list_paths(&self) -> Result<Vec<TrainingPath>> {
        Ok(paths_in_order(self.paths.read().await.values()))
    }
}

#[async_trait]
impl ProgressStore for MemoryStorage {
    async fn get_progress(
        &self,
        learner_id: &LearnerId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<ProgressRecord>> {
        let progress = self.progress.lock().await;
        Ok(module_ids
            .iter()
            .filter_map(|id| progress.get(&(learner_id.clone(), *id)).cloned())
            .collect())
    }

    async fn upsert_progress(
        &self,
        learner_id: &LearnerId,
        module_id: ModuleId,
        update: ProgressUpdate,
    ) -> Result<ProgressRecord> {
        let now = chrono::Utc::now();
        let record = {
            let mut progress = self.progress.lock().await;
            let record = progress
                .entry((learner_id.clone(), module_id))
                .or_insert_with(|| ProgressRecord::new(learner_id.clone(), module_id, now));
            record.apply(&update, now);
            record.clone()
        };
        self.feed.publish(&record);
        Ok(record)
    }

    fn subscribe(&self, learner_id: &LearnerId) -> Option<ProgressSubscription> {
        Some(self.feed.subscribe(learner_id))
    }
}

#[async_trait]
impl PathProgressStore for MemoryStorage {
    async fn get_path_progress(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
    ) -> Result<Option<PathProgressRecord>> {
        Ok(self.path_progress.lock().await.get(&(learner_id.clone(), path_id)).cloned())
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
        let mut path_progress = self.path_progress.lock().await;
        let key = (learner_id.clone(), path_id);
        let mut record = path_progress
            .get(&key)
            .cloned()
            .unwrap_or_else(|| PathProgressRecord::new(learner_id.clone(), path_id, at));
        if !record.accepts_attempt(max_attempts) {
            return Ok(None);
        }
        record.record_attempt(score, passed, at);
        path_progress.insert(key, record.clone());
        Ok(Some(record))
    }
}
