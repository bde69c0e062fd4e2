//! Derived, non-persisted views over progress.

use serde::{Deserialize, Serialize};
use crate::id::ModuleId;
use crate::progress::ProgressStatus;

/// Lock state of one module for one learner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessStatus {
    /// Module
    pub module_id: ModuleId,

    /// Module title
    pub module_title: String,

    /// Sequential position
    pub order_index: i32,

    /// Learner's status on the module
    pub status: ProgressStatus,

    /// Whether the module is locked
    pub is_locked: bool,

    /// Human readable reason when locked
    pub reason: Option<String>,

    /// Title of the module that must be completed first
    pub previous_module_title: Option<String>,
}

/// Path-level completion summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathSummary {
    /// Modules with status `completed`
    pub completed_count: usize,

    /// Active modules in the path
    pub total_count: usize,

    /// Rounded completion percentage (0-100)
    pub percentage: u8,

    /// Every module completed, and there is at least one
    pub is_path_complete: bool,
}
