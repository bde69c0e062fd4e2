//! Learner progress records.

use serde::{Deserialize, Serialize};
use crate::id::{LearnerId, ModuleId, PathId};
use crate::Time;

/// Status of a learner on a module or path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    /// Never opened
    NotStarted,
    /// Opened, not yet completed
    InProgress,
    /// Completed
    Completed,
}

impl ProgressStatus {
    /// Get string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }

    /// Whether this status counts as done for unlocking.
    pub fn is_completed(&self) -> bool {
        matches!(self, ProgressStatus::Completed)
    }
}

impl std::fmt::Display for ProgressStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProgressStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_started" => Ok(ProgressStatus::NotStarted),
            "in_progress" => Ok(ProgressStatus::InProgress),
            "completed" => Ok(ProgressStatus::Completed),
            other => Err(format!("unknown progress status: {other}")),
        }
    }
}

/// One learner's durable progress on one module.
///
/// At most one record exists per (learner, module); a missing record means
/// the learner has not started the module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    /// Learner
    pub learner_id: LearnerId,

    /// Module
    pub module_id: ModuleId,

    /// Current status
    pub status: ProgressStatus,

    /// Last recorded quiz score (0-100)
    pub score: Option<u8>,

    /// Quiz submissions so far
    pub attempts: u32,

    /// When the module was completed
    pub completed_at: Option<Time>,

    /// Last write
    pub updated_at: Time,
}

impl ProgressRecord {
    /// Create the initial record for a (learner, module) pair.
    pub fn new(learner_id: LearnerId, module_id: ModuleId, at: Time) -> Self {
        Self {
            learner_id,
            module_id,
            status: ProgressStatus::NotStarted,
            score: None,
            attempts: 0,
            completed_at: None,
            updated_at: at,
        }
    }

    /// Apply a write request to this record.
    ///
    /// The completion timestamp is cleared when the new status is not
    /// `completed`. Otherwise the update's timestamp wins, then the stored
    /// one, then the write time.
    ///
    /// With `keep_completed`, a record that is already `completed` stays
    /// completed, keeps its completion timestamp and keeps the best score.
    pub fn apply(&mut self, update: &ProgressUpdate, at: Time) {
        let keep = update.keep_completed && self.status.is_completed();
        if let Some(score) = update.score {
            self.score = match self.score {
                Some(best) if keep => Some(best.max(score)),
                _ => Some(score),
            };
        }
        self.attempts = self.attempts.saturating_add(update.attempts_delta);
        if keep {
            self.completed_at = self.completed_at.or(update.completed_at).or(Some(at));
        } else {
            self.status = update.status;
            self.completed_at = match update.status {
                ProgressStatus::Completed => update.completed_at.or(self.completed_at).or(Some(at)),
                _ => None,
            };
        }
        self.updated_at = at;
    }
}

/// Write request for [`ProgressRecord`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// New status
    pub status: ProgressStatus,

    /// New score, `None` keeps the stored one
    pub score: Option<u8>,

    /// Added to the attempt counter
    pub attempts_delta: u32,

    /// Completion timestamp to record
    pub completed_at: Option<Time>,

    /// Never move a `completed` record away from `completed`
    pub keep_completed: bool,
}

impl ProgressUpdate {
    /// Plain status change.
    pub fn status(status: ProgressStatus) -> Self {
        Self {
            status,
            score: None,
            attempts_delta: 0,
            completed_at: None,
            keep_completed: false,
        }
    }
}

/// A learner's progress on a whole path (capstone quiz state).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathProgressRecord {
    /// Learner
    pub learner_id: LearnerId,

    /// Path
    pub path_id: PathId,

    /// `completed` once the capstone quiz is passed
    pub status: ProgressStatus,

    /// Best capstone score
    pub best_score: Option<u8>,

    /// Capstone attempts used
    pub attempts: u32,

    /// When the capstone was passed
    pub completed_at: Option<Time>,

    /// Last write
    pub updated_at: Time,
}

impl PathProgressRecord {
    /// Create the initial record.
    pub fn new(learner_id: LearnerId, path_id: PathId, at: Time) -> Self {
        Self {
            learner_id,
            path_id,
            status: ProgressStatus::InProgress,
            best_score: None,
            attempts: 0,
            completed_at: None,
            updated_at: at,
        }
    }

    /// Whether another capstone attempt may be recorded: the path is not
    /// passed yet and fewer than `max_attempts` attempts were used.
    pub fn accepts_attempt(&self, max_attempts: u32) -> bool {
        !self.status.is_completed() && self.attempts < max_attempts
    }

    /// Record one capstone attempt. A passed path is never downgraded.
    pub fn record_attempt(&mut self, score: u8, passed: bool, at: Time) {
        self.attempts = self.attempts.saturating_add(1);
        self.best_score = Some(self.best_score.map_or(score, |best| best.max(score)));
        if passed && self.status != ProgressStatus::Completed {
            self.status = ProgressStatus::Completed;
            self.completed_at = Some(at);
        }
        self.updated_at = at;
    }
}
