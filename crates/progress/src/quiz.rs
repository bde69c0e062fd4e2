//! Module quiz scoring and learner-driven module progress.
//!
//! A failing re-submission never downgrades a module that is already
//! `completed`; once completed, the stored score is the best one.

use std::sync::Arc;
use tracing::{debug, info};
use trainpath_core::{
    LearnerId, Module, ModuleId, ProgressRecord, ProgressStatus, ProgressUpdate, QuizQuestion,
};
use trainpath_storage::{ModuleCatalog, ProgressStore};

use crate::config::DEFAULT_PASSING_SCORE;
use crate::error::{ProgressError, Result};
use crate::summary::round_percent;

/// Score of one answer sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizScore {
    /// Correctly answered questions
    pub correct: usize,
    /// Questions in the quiz
    pub total: usize,
    /// Rounded percentage (0-100)
    pub score: u8,
}

/// Score `answers` (one entry per question, `None` = unanswered).
pub fn score_answers(questions: &[QuizQuestion], answers: &[Option<usize>]) -> Result<QuizScore> {
    if answers.len() != questions.len() {
        return Err(ProgressError::InvalidAnswers {
            expected: questions.len(),
            actual: answers.len(),
        });
    }
    let correct = questions
        .iter()
        .zip(answers)
        .filter(|(q, a)| **a == Some(q.correct_index))
        .count();
    Ok(QuizScore {
        correct,
        total: questions.len(),
        score: round_percent(correct, questions.len()),
    })
}

/// Result of a module quiz submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizOutcome {
    /// This submission's score
    pub score: u8,
    /// Correct answers
    pub correct: usize,
    /// Questions
    pub total: usize,
    /// Whether this submission met the threshold
    pub passed: bool,
    /// Module status after the submission
    pub status: ProgressStatus,
    /// Total submissions so far
    pub attempts: u32,
}

/// Records learner actions on modules: viewing, quizzes and completion.
#[derive(Clone)]
pub struct ModuleProgress {
    catalog: Arc<dyn ModuleCatalog>,
    progress: Arc<dyn ProgressStore>,
    passing_score: u8,
}

impl ModuleProgress {
    /// Create with the default 80% threshold.
    pub fn new(catalog: Arc<dyn ModuleCatalog>, progress: Arc<dyn ProgressStore>) -> Self {
        Self {
            catalog,
            progress,
            passing_score: DEFAULT_PASSING_SCORE,
        }
    }

    /// Override the passing threshold.
    pub fn with_passing_score(mut self, passing_score: u8) -> Self {
        self.passing_score = passing_score.min(100);
        self
    }

    async fn module(&self, module_id: ModuleId) -> Result<Module> {
        self.catalog
            .load_module(module_id)
            .await?
            .ok_or(ProgressError::ModuleNotFound(module_id))
    }

    async fn record(&self, learner_id: &LearnerId, module_id: ModuleId) -> Result<Option<ProgressRecord>> {
        Ok(self.progress.get_progress(learner_id, &[module_id]).await?.into_iter().next())
    }

    /// First view of a module creates an `in_progress` record.
    ///
    /// Existing records are returned untouched.
    pub async fn record_view(&self, learner_id: &LearnerId, module_id: ModuleId) -> Result<ProgressRecord> {
        self.module(module_id).await?;
        if let Some(existing) = self.record(learner_id, module_id).await? {
            if existing.status != ProgressStatus::NotStarted {
                return Ok(existing);
            }
        }
        debug!(learner = %learner_id, module = %module_id, "module started");
        Ok(self
            .progress
            .upsert_progress(learner_id, module_id, ProgressUpdate::status(ProgressStatus::InProgress))
            .await?)
    }

    /// Score and record a module quiz submission.
    pub async fn submit_quiz(
        &self,
        learner_id: &LearnerId,
        module_id: ModuleId,
        answers: &[Option<usize>],
    ) -> Result<QuizOutcome> {
        let module = self.module(module_id).await?;
        let quiz = module
            .quiz
            .as_ref()
            .filter(|q| !q.questions.is_empty())
            .ok_or(ProgressError::NoQuiz(module_id))?;
        let QuizScore { correct, total, score } = score_answers(&quiz.questions, answers)?;

        let passed = score >= self.passing_score;

        // A completed module stays completed with its best score; the store
        // applies that against its current record.
        let update = ProgressUpdate {
            status: if passed { ProgressStatus::Completed } else { ProgressStatus::InProgress },
            score: Some(score),
            attempts_delta: 1,
            completed_at: passed.then(chrono::Utc::now),
            keep_completed: true,
        };
        let record = self.progress.upsert_progress(learner_id, module_id, update).await?;

        if passed {
            info!("Learner {} passed '{}' with {}%", learner_id, module.title, score);
        } else {
            debug!("Learner {} scored {}% on '{}' (needs {}%)", learner_id, score, module.title, self.passing_score);
        }

        Ok(QuizOutcome {
            score,
            correct,
            total,
            passed,
            status: record.status,
            attempts: record.attempts,
        })
    }

    /// Complete a module that has no quiz.
    pub async fn mark_complete(&self, learner_id: &LearnerId, module_id: ModuleId) -> Result<ProgressRecord> {
        let module = self.module(module_id).await?;
        if module.has_quiz() {
            return Err(ProgressError::QuizRequired(module_id));
        }
        if let Some(existing) = self.record(learner_id, module_id).await? {
            if existing.status.is_completed() {
                return Ok(existing);
            }
        }
        info!("Learner {} completed '{}'", learner_id, module.title);
        let update = ProgressUpdate {
            completed_at: Some(chrono::Utc::now()),
            ..ProgressUpdate::status(ProgressStatus::Completed)
        };
        Ok(self.progress.upsert_progress(learner_id, module_id, update).await?)
    }

    /// Administrative override of a learner's module status.
    pub async fn override_status(
        &self,
        learner_id: &LearnerId,
        module_id: ModuleId,
        status: ProgressStatus,
    ) -> Result<ProgressRecord> {
        let module = self.module(module_id).await?;
        info!("Overriding '{}' for learner {} to {}", module.title, learner_id, status);
        Ok(self
            .progress
            .upsert_progress(learner_id, module_id, ProgressUpdate::status(status))
            .await?)
    }
}
