//! Path-level completion summary.

use std::collections::HashMap;
use std::sync::Arc;
use trainpath_core::{LearnerId, Module, ModuleId, PathId, PathSummary, ProgressRecord};
use trainpath_storage::{ModuleCatalog, ProgressStore};

use crate::access::load_path_state;
use crate::error::Result;

/// Aggregates module progress into path completion.
#[derive(Clone)]
pub struct PathProgressSummary {
    catalog: Arc<dyn ModuleCatalog>,
    progress: Arc<dyn ProgressStore>,
}

impl PathProgressSummary {
    /// Create a summary service.
    pub fn new(catalog: Arc<dyn ModuleCatalog>, progress: Arc<dyn ProgressStore>) -> Self {
        Self { catalog, progress }
    }

    /// Completion of `path_id` for `learner_id`.
    pub async fn summarize(&self, learner_id: &LearnerId, path_id: PathId) -> Result<PathSummary> {
        let (modules, records) = load_path_state(&*self.catalog, &*self.progress, learner_id, path_id).await?;
        Ok(summarize_modules(&modules, &records))
    }
}

/// Summarize `modules` against the learner's records.
pub fn summarize_modules(
    modules: &[Module],
    records: &HashMap<ModuleId, ProgressRecord>,
) -> PathSummary {
    let total_count = modules.len();
    let completed_count = modules
        .iter()
        .filter(|m| records.get(&m.id).is_some_and(|r| r.status.is_completed()))
        .count();

    PathSummary {
        completed_count,
        total_count,
        percentage: round_percent(completed_count, total_count),
        is_path_complete: total_count > 0 && completed_count == total_count,
    }
}

/// `part / total * 100` rounded half up; 0 when `total` is 0.
pub fn round_percent(part: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    let part = part.min(total) as u64;
    let total = total as u64;
    ((part * 200 + total) / (total * 2)) as u8
}
