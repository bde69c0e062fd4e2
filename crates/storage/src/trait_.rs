//! Storage trait abstraction.
//!
//! The unlocking engine only ever talks to these traits. Module catalog
//! lookups, per-module progress and per-path (capstone) progress are split so
//! a deployment can back them with different services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use trainpath_core::{
    LearnerId, Module, ModuleId, PathId, PathProgressRecord, ProgressRecord, ProgressUpdate,
    Time, TrainingPath,
};

/// Error type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Item not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Rejected input
    #[error("Invalid data: {0}")]
    Invalid(String),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl StorageError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io(_) | StorageError::Unavailable(_))
    }
}

/// Read access to training paths and their modules.
#[async_trait]
pub trait ModuleCatalog: Send + Sync {
    /// Active modules of a path, sorted by `order_index` ascending.
    ///
    /// Implementations must preserve this ordering; the unlocking engine
    /// relies on it.
    async fn list_modules_for_path(&self, path_id: PathId) -> Result<Vec<Module>>;

    /// Load a module by ID.
    async fn load_module(&self, id: ModuleId) -> Result<Option<Module>>;

    /// Load a path by ID.
    async fn load_path(&self, id: PathId) -> Result<Option<TrainingPath>>;

    /// Active paths sorted by `order_index`.
    async fn list_paths(&self) -> Result<Vec<TrainingPath>>;
}

/// Durable per-module progress.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Records for `learner_id` restricted to `module_ids`. Modules without a
    /// record are simply absent.
    async fn get_progress(
        &self,
        learner_id: &LearnerId,
        module_ids: &[ModuleId],
    ) -> Result<Vec<ProgressRecord>>;

    /// Create or update the record for (learner, module).
    ///
    /// `attempts_delta` is applied atomically with respect to other writes to
    /// the same record.
    async fn upsert_progress(
        &self,
        learner_id: &LearnerId,
        module_id: ModuleId,
        update: ProgressUpdate,
    ) -> Result<ProgressRecord>;

    /// Subscribe to record changes of one learner.
    ///
    /// Returns `None` when the backend cannot push changes; callers poll.
    fn subscribe(&self, _learner_id: &LearnerId) -> Option<ProgressSubscription> {
        None
    }
}

/// Durable per-path progress, used by the capstone quiz.
#[async_trait]
pub trait PathProgressStore: Send + Sync {
    /// Load the path record.
    async fn get_path_progress(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
    ) -> Result<Option<PathProgressRecord>>;

    /// Record one capstone attempt, creating the path record if needed.
    ///
    /// The attempt limit is checked and the attempt recorded as one atomic
    /// step. Returns `None` without writing when the path is already passed
    /// or `max_attempts` attempts were used.
    async fn record_capstone_attempt(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
        score: u8,
        passed: bool,
        max_attempts: u32,
        at: Time,
    ) -> Result<Option<PathProgressRecord>>;
}

/// Content document used to seed or replace a catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Training paths
    #[serde(default)]
    pub paths: Vec<TrainingPath>,

    /// Modules
    #[serde(default)]
    pub modules: Vec<Module>,
}

impl Catalog {
    /// Reject malformed quizzes, capstones without questions and duplicate
    /// positions in a path.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for module in &self.modules {
            if let Some(quiz) = &module.quiz {
                quiz.validate()
                    .map_err(|e| StorageError::Invalid(format!("module '{}': {}", module.title, e)))?;
            }
            if let Some(path_id) = module.path_id {
                if module.is_active && !seen.insert((path_id, module.order_index)) {
                    return Err(StorageError::Invalid(format!(
                        "duplicate order_index {} in path {}",
                        module.order_index, path_id
                    )));
                }
            }
        }
        for path in &self.paths {
            if let Some(capstone) = &path.capstone {
                if capstone.questions.is_empty() {
                    return Err(StorageError::Invalid(format!(
                        "capstone '{}' has no questions",
                        path.name
                    )));
                }
                trainpath_core::ModuleQuiz::new(capstone.questions.clone())
                    .validate()
                    .map_err(|e| StorageError::Invalid(format!("capstone '{}': {}", path.name, e)))?;
            }
        }
        Ok(())
    }
}

/// Select the active modules of `path_id` in their sequential order.
pub(crate) fn modules_in_order<'a>(
    modules: impl IntoIterator<Item = &'a Module>,
    path_id: PathId,
) -> Vec<Module> {
    let mut selected: Vec<Module> = modules
        .into_iter()
        .filter(|m| m.is_active && m.path_id == Some(path_id))
        .cloned()
        .collect();
    selected.sort_by_key(|m| m.order_index);
    selected
}

/// Active paths in display order.
pub(crate) fn paths_in_order<'a>(paths: impl IntoIterator<Item = &'a TrainingPath>) -> Vec<TrainingPath> {
    let mut selected: Vec<TrainingPath> = paths.into_iter().filter(|p| p.is_active).cloned().collect();
    selected.sort_by(|a, b| a.order_index.cmp(&b.order_index).then_with(|| a.name.cmp(&b.name)));
    selected
}

/// A change observed on a learner's progress.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressChange {
    /// A record was inserted or updated
    Updated(ProgressRecord),
    /// The subscriber fell behind and missed this many changes
    Lagged(u64),
}

/// Fan-out of progress writes to subscribers.
#[derive(Debug, Clone)]
pub struct ChangeFeed {
    tx: broadcast::Sender<ProgressRecord>,
}

impl ChangeFeed {
    /// Create a feed buffering up to `capacity` changes per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish a written record.
    pub fn publish(&self, record: &ProgressRecord) {
        // No subscribers is not an error.
        let _ = self.tx.send(record.clone());
    }

    /// Subscribe to one learner's changes.
    pub fn subscribe(&self, learner_id: &LearnerId) -> ProgressSubscription {
        ProgressSubscription {
            learner_id: learner_id.clone(),
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Receiving end of a learner subscription.
pub struct ProgressSubscription {
    learner_id: LearnerId,
    rx: broadcast::Receiver<ProgressRecord>,
}

impl ProgressSubscription {
    /// The subscribed learner.
    pub fn learner_id(&self) -> &LearnerId {
        &self.learner_id
    }

    /// Wait for the next change. Returns `None` once the store is gone.
    pub async fn next(&mut self) -> Option<ProgressChange> {
        loop {
            match self.rx.recv().await {
                Ok(record) if record.learner_id == self.learner_id => {
                    return Some(ProgressChange::Updated(record));
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(learner = %self.learner_id, missed, "progress subscription lagged");
                    return Some(ProgressChange::Lagged(missed));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trainpath_core::{CapstoneQuiz, ModuleQuiz, ProgressStatus, QuizQuestion};

    #[test]
    fn test_modules_in_order_filters_and_sorts() {
        let path = PathId::new();
        let mut inactive = Module::new(path, "Retired", 0);
        inactive.is_active = false;
        let modules = vec![
            Module::new(path, "C", 20),
            Module::new(path, "A", 1),
            Module::new(PathId::new(), "Elsewhere", 2),
            inactive,
            Module::new(path, "B", 5),
        ];

        let titles: Vec<_> = modules_in_order(&modules, path).into_iter().map(|m| m.title).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_catalog_rejects_duplicate_positions() {
        let path = TrainingPath::new("Onboarding");
        let catalog = Catalog {
            modules: vec![Module::new(path.id, "A", 1), Module::new(path.id, "B", 1)],
            paths: vec![path],
        };
        assert!(matches!(catalog.validate(), Err(StorageError::Invalid(_))));
    }

    #[test]
    fn test_catalog_rejects_bad_quiz() {
        let path = TrainingPath::new("Onboarding");
        let quiz = ModuleQuiz::new(vec![QuizQuestion::new("?", vec!["a".into(), "b".into()], 7)]);
        let catalog = Catalog {
            modules: vec![Module::new(path.id, "A", 0).with_quiz(quiz)],
            paths: vec![path],
        };
        assert!(catalog.validate().is_err());
    }

    #[test]
    fn test_catalog_rejects_empty_capstone() {
        let path = TrainingPath::new("Onboarding").with_capstone(CapstoneQuiz::new("Final", Vec::new()));
        let catalog = Catalog {
            modules: vec![Module::new(path.id, "A", 0)],
            paths: vec![path],
        };
        match catalog.validate() {
            Err(StorageError::Invalid(msg)) => assert!(msg.contains("no questions")),
            other => panic!("expected Invalid, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_only_sees_own_learner() {
        let feed = ChangeFeed::default();
        let me = LearnerId::new("me");
        let mut sub = feed.subscribe(&me);

        let now = chrono::Utc::now();
        feed.publish(&ProgressRecord::new(LearnerId::new("someone-else"), ModuleId::new(), now));
        let mut mine = ProgressRecord::new(me.clone(), ModuleId::new(), now);
        mine.status = ProgressStatus::Completed;
        feed.publish(&mine);

        assert_eq!(sub.next().await, Some(ProgressChange::Updated(mine)));
    }

    #[tokio::test]
    async fn test_subscription_reports_lag() {
        let feed = ChangeFeed::new(1);
        let me = LearnerId::new("me");
        let mut sub = feed.subscribe(&me);
        let now = chrono::Utc::now();
        for _ in 0..3 {
            feed.publish(&ProgressRecord::new(me.clone(), ModuleId::new(), now));
        }
        assert!(matches!(sub.next().await, Some(ProgressChange::Lagged(_))));
    }
}
