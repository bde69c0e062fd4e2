//! Capstone quiz gate.
//!
//! A path's capstone quiz opens once every module of the path is completed.
//! Attempts are capped by `max_attempts`; passing marks the path record
//! `completed`. The store enforces the cap when it records an attempt, so
//! concurrent submissions cannot exceed it.

use std::sync::Arc;
use tracing::info;
use trainpath_core::{
    CapstoneQuiz, LearnerId, PathId, PathSummary, ProgressStatus, TrainingPath,
};
use trainpath_storage::{ModuleCatalog, PathProgressStore, ProgressStore};

use crate::error::{ProgressError, Result};
use crate::quiz::{score_answers, QuizScore};
use crate::summary::PathProgressSummary;

/// Whether a learner may take a path's capstone quiz right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapstoneAvailability {
    /// The path has no capstone quiz
    NoCapstone,
    /// Some modules are still incomplete
    Locked {
        /// Current path completion
        summary: PathSummary,
    },
    /// Attempts remain
    Open {
        /// Attempts used so far
        attempts_used: u32,
        /// Attempts left
        attempts_remaining: u32,
        /// Best score so far
        best_score: Option<u8>,
    },
    /// Already passed
    Passed {
        /// Best score
        best_score: Option<u8>,
        /// Attempts used
        attempts_used: u32,
    },
    /// Every attempt used without passing
    Exhausted {
        /// Best score
        best_score: Option<u8>,
        /// Attempts used
        attempts_used: u32,
    },
}

impl CapstoneAvailability {
    /// Attempts the learner can still make.
    pub fn attempts_remaining(&self) -> u32 {
        match self {
            CapstoneAvailability::Open { attempts_remaining, .. } => *attempts_remaining,
            _ => 0,
        }
    }

    /// Whether an attempt may be submitted now.
    pub fn can_attempt(&self) -> bool {
        matches!(self, CapstoneAvailability::Open { .. })
    }
}

/// A scored capstone attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapstoneOutcome {
    /// Score of this attempt
    pub score: u8,
    /// Correct answers
    pub correct: usize,
    /// Questions
    pub total: usize,
    /// Whether this attempt met `passing_score`
    pub passed: bool,
    /// Best score across attempts
    pub best_score: Option<u8>,
    /// Attempts used including this one
    pub attempts_used: u32,
    /// Attempts left
    pub attempts_remaining: u32,
    /// Path status after the attempt
    pub path_status: ProgressStatus,
}

/// Result of submitting a capstone attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapstoneSubmission {
    /// The attempt was scored and recorded
    Scored(CapstoneOutcome),
    /// The attempt was not accepted; nothing was recorded
    Refused(CapstoneAvailability),
}

/// Gates and scores capstone quizzes.
#[derive(Clone)]
pub struct CapstoneGate {
    catalog: Arc<dyn ModuleCatalog>,
    summary: PathProgressSummary,
    path_progress: Arc<dyn PathProgressStore>,
}

impl CapstoneGate {
    /// Create a gate.
    pub fn new(
        catalog: Arc<dyn ModuleCatalog>,
        progress: Arc<dyn ProgressStore>,
        path_progress: Arc<dyn PathProgressStore>,
    ) -> Self {
        Self {
            summary: PathProgressSummary::new(catalog.clone(), progress),
            catalog,
            path_progress,
        }
    }

    async fn active_path(&self, path_id: PathId) -> Result<TrainingPath> {
        match self.catalog.load_path(path_id).await? {
            Some(path) if path.is_active => Ok(path),
            _ => Err(ProgressError::PathNotFound(path_id)),
        }
    }

    /// Current capstone state for a learner.
    pub async fn availability(&self, learner_id: &LearnerId, path_id: PathId) -> Result<CapstoneAvailability> {
        let path = self.active_path(path_id).await?;
        match &path.capstone {
            Some(capstone) => self.availability_for(learner_id, path_id, capstone).await,
            None => Ok(CapstoneAvailability::NoCapstone),
        }
    }

    async fn availability_for(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
        capstone: &CapstoneQuiz,
    ) -> Result<CapstoneAvailability> {
        let record = self.path_progress.get_path_progress(learner_id, path_id).await?;
        let (attempts_used, best_score) = record
            .as_ref()
            .map_or((0, None), |r| (r.attempts, r.best_score));

        if record.as_ref().is_some_and(|r| r.status.is_completed()) {
            return Ok(CapstoneAvailability::Passed { best_score, attempts_used });
        }

        let summary = self.summary.summarize(learner_id, path_id).await?;
        if !summary.is_path_complete {
            return Ok(CapstoneAvailability::Locked { summary });
        }

        if attempts_used >= capstone.max_attempts {
            return Ok(CapstoneAvailability::Exhausted { best_score, attempts_used });
        }

        Ok(CapstoneAvailability::Open {
            attempts_used,
            attempts_remaining: capstone.max_attempts - attempts_used,
            best_score,
        })
    }

    /// Score and record a capstone attempt if one is allowed.
    pub async fn submit(
        &self,
        learner_id: &LearnerId,
        path_id: PathId,
        answers: &[Option<usize>],
    ) -> Result<CapstoneSubmission> {
        let path = self.active_path(path_id).await?;
        let Some(capstone) = &path.capstone else {
            return Ok(CapstoneSubmission::Refused(CapstoneAvailability::NoCapstone));
        };

        let availability = self.availability_for(learner_id, path_id, capstone).await?;
        if !availability.can_attempt() {
            return Ok(CapstoneSubmission::Refused(availability));
        }

        let QuizScore { correct, total, score } = score_answers(&capstone.questions, answers)?;
        let passed = score >= capstone.passing_score;
        let recorded = self
            .path_progress
            .record_capstone_attempt(learner_id, path_id, score, passed, capstone.max_attempts, chrono::Utc::now())
            .await?;
        // A concurrent submission used the last attempt or passed first.
        let Some(record) = recorded else {
            let availability = self.availability_for(learner_id, path_id, capstone).await?;
            return Ok(CapstoneSubmission::Refused(availability));
        };

        if passed {
            info!("Learner {} passed capstone of '{}' with {}%", learner_id, path.name, score);
        }

        Ok(CapstoneSubmission::Scored(CapstoneOutcome {
            score,
            correct,
            total,
            passed,
            best_score: record.best_score,
            attempts_used: record.attempts,
            attempts_remaining: if record.status.is_completed() {
                0
            } else {
                capstone.max_attempts.saturating_sub(record.attempts)
            },
            path_status: record.status,
        }))
    }
}
