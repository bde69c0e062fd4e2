//! Sequential module unlocking.
//!
//! Within a path, modules are gated strictly by `order_index`: the first
//! module is always open, and every later module opens once the module
//! directly before it is `completed`. Nothing else (score, elapsed time,
//! role) unlocks a module.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use trainpath_core::{
    AccessStatus, LearnerId, Module, ModuleId, PathId, ProgressRecord, ProgressStatus, Time,
};
use trainpath_storage::{ModuleCatalog, ProgressStore};

use crate::error::{ProgressError, Result};
use crate::retry::with_retry;

/// Computes per-module lock state for a learner on a path.
#[derive(Clone)]
pub struct PathAccessEngine {
    catalog: Arc<dyn ModuleCatalog>,
    progress: Arc<dyn ProgressStore>,
    retries: u32,
    retry_delay: Duration,
}

impl PathAccessEngine {
    /// Create an engine over a catalog and a progress store.
    pub fn new(catalog: Arc<dyn ModuleCatalog>, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            catalog,
            progress,
            retries: 0,
            retry_delay: Duration::ZERO,
        }
    }

    /// Retry transient store failures when building snapshots.
    pub fn with_retry_policy(mut self, retries: u32, delay: Duration) -> Self {
        self.retries = retries;
        self.retry_delay = delay;
        self
    }

    /// The progress store this engine reads.
    pub fn progress_store(&self) -> &Arc<dyn ProgressStore> {
        &self.progress
    }

    /// Lock state of every active module of `path_id`, in `order_index` order.
    ///
    /// Store failures are returned as errors so callers can tell "data
    /// unavailable" apart from "legitimately locked".
    pub async fn get_access_status(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
    ) -> Result<Vec<AccessStatus>> {
        let (modules, records) = load_path_state(&*self.catalog, &*self.progress, learner_id, path_id).await?;
        let statuses = compute_access(&modules, &records);
        debug!(
            learner = %learner_id,
            path = %path_id,
            unlocked = statuses.iter().filter(|s| !s.is_locked).count(),
            total = statuses.len(),
            "computed access status"
        );
        Ok(statuses)
    }

    /// Compute a snapshot, falling back to an all-locked one on failure.
    ///
    /// `previous` keeps module titles visible in the failed snapshot.
    pub async fn snapshot(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
        previous: Option<&AccessSnapshot>,
    ) -> AccessSnapshot {
        let result = with_retry(self.retries, self.retry_delay, || {
            self.get_access_status(learner_id, path_id)
        })
        .await;

        match result {
            Ok(statuses) => AccessSnapshot::ready(path_id, statuses),
            Err(e) => {
                warn!("Access status for path {} unavailable, locking all modules: {}", path_id, e);
                let known = previous.map(|p| p.statuses.as_slice()).unwrap_or(&[]);
                AccessSnapshot::failed(path_id, known, &e)
            }
        }
    }

    /// Whether a single module is locked for the learner.
    ///
    /// Any lookup failure reports the module as locked. Modules outside any
    /// path are standalone: they have no predecessor and are locked only when
    /// inactive.
    pub async fn is_module_locked(&self, learner_id: &LearnerId, module_id: ModuleId) -> bool {
        let module = match self.catalog.load_module(module_id).await {
            Ok(Some(module)) => module,
            Ok(None) => {
                warn!("Module {} not found, reporting it locked", module_id);
                return true;
            }
            Err(e) => {
                warn!("Module {} lookup failed, reporting it locked: {}", module_id, e);
                return true;
            }
        };
        let Some(path_id) = module.path_id else {
            return !module.is_active;
        };

        match self.get_access_status(learner_id, path_id).await {
            Ok(statuses) => AccessSnapshot::ready(path_id, statuses).is_module_locked(module_id),
            Err(e) => {
                warn!("Access status for module {} unavailable, reporting it locked: {}", module_id, e);
                true
            }
        }
    }
}

/// Load the ordered modules of an active path and the learner's records for
/// them, keyed by module.
pub(crate) async fn load_path_state(
    catalog: &dyn ModuleCatalog,
    progress: &dyn ProgressStore,
    learner_id: &LearnerId,
    path_id: PathId,
) -> Result<(Vec<Module>, HashMap<ModuleId, ProgressRecord>)> {
    match catalog.load_path(path_id).await? {
        Some(path) if path.is_active => {}
        _ => return Err(ProgressError::PathNotFound(path_id)),
    }

    let mut modules = catalog.list_modules_for_path(path_id).await?;
    // Order is load-bearing; do not trust the backend blindly.
    modules.retain(|m| m.is_active);
    modules.sort_by_key(|m| m.order_index);

    let ids: Vec<ModuleId> = modules.iter().map(|m| m.id).collect();
    let records = progress
        .get_progress(learner_id, &ids)
        .await?
        .into_iter()
        .map(|r| (r.module_id, r))
        .collect();

    Ok((modules, records))
}

/// Apply the sequential gate to `modules` (already in `order_index` order).
///
/// A module without a record counts as `not_started`.
pub fn compute_access(
    modules: &[Module],
    records: &HashMap<ModuleId, ProgressRecord>,
) -> Vec<AccessStatus> {
    let status_of = |id: &ModuleId| {
        records.get(id).map_or(ProgressStatus::NotStarted, |r| r.status)
    };

    modules
        .iter()
        .enumerate()
        .map(|(i, module)| {
            let blocker = i
                .checked_sub(1)
                .map(|prev| &modules[prev])
                .filter(|prev| !status_of(&prev.id).is_completed());

            AccessStatus {
                module_id: module.id,
                module_title: module.title.clone(),
                order_index: module.order_index,
                status: status_of(&module.id),
                is_locked: blocker.is_some(),
                reason: blocker.map(|prev| format!("Complete '{}' first", prev.title)),
                previous_module_title: blocker.map(|prev| prev.title.clone()),
            }
        })
        .collect()
}

/// The last computed access list for one learner and path.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessSnapshot {
    /// Path the snapshot belongs to
    pub path_id: PathId,
    /// Per-module lock state in `order_index` order
    pub statuses: Vec<AccessStatus>,
    /// Set when the computation failed; every module then reads as locked
    pub error: Option<String>,
    /// When the snapshot was computed
    pub computed_at: Time,
}

impl AccessSnapshot {
    /// A successfully computed snapshot.
    pub fn ready(path_id: PathId, statuses: Vec<AccessStatus>) -> Self {
        Self {
            path_id,
            statuses,
            error: None,
            computed_at: chrono::Utc::now(),
        }
    }

    /// A failed computation. Known modules are kept for display but locked.
    pub fn failed(path_id: PathId, known: &[AccessStatus], error: &ProgressError) -> Self {
        let statuses = known
            .iter()
            .cloned()
            .map(|mut s| {
                s.is_locked = true;
                s.reason = Some("Progress is temporarily unavailable, try again".to_string());
                s
            })
            .collect();
        Self {
            path_id,
            statuses,
            error: Some(error.to_string()),
            computed_at: chrono::Utc::now(),
        }
    }

    /// Whether the computation failed.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    /// Lock state of `module_id`; unknown modules and failed snapshots read
    /// as locked.
    pub fn is_module_locked(&self, module_id: ModuleId) -> bool {
        if self.is_failed() {
            return true;
        }
        self.get(module_id).map_or(true, |s| s.is_locked)
    }

    /// Entry for `module_id`.
    pub fn get(&self, module_id: ModuleId) -> Option<&AccessStatus> {
        self.statuses.iter().find(|s| s.module_id == module_id)
    }

    /// First unlocked module the learner has not completed yet.
    pub fn next_module(&self) -> Option<&AccessStatus> {
        if self.is_failed() {
            return None;
        }
        self.statuses
            .iter()
            .find(|s| !s.is_locked && !s.status.is_completed())
    }

    /// Whether a change to `module_id` can affect this snapshot.
    pub fn concerns(&self, module_id: ModuleId) -> bool {
        self.is_failed() || self.get(module_id).is_some()
    }
}
