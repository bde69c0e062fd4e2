//! Progress engine errors.

use trainpath_core::{ModuleId, PathId};
use trainpath_storage::StorageError;

/// Result type for progress operations.
pub type Result<T> = std::result::Result<T, ProgressError>;

/// Errors surfaced by the progress services.
///
/// Attempt exhaustion and capstone eligibility are not errors; they are
/// reported as regular result values.
#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    /// The catalog or progress store could not be read or written
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StorageError),

    /// No active training path with this ID
    #[error("training path not found: {0}")]
    PathNotFound(PathId),

    /// No module with this ID
    #[error("module not found: {0}")]
    ModuleNotFound(ModuleId),

    /// Answer sheet does not match the quiz
    #[error("expected {expected} answers, got {actual}")]
    InvalidAnswers {
        /// Number of questions
        expected: usize,
        /// Number of answers submitted
        actual: usize,
    },

    /// Module must be completed by passing its quiz
    #[error("module {0} has a quiz; pass it to complete the module")]
    QuizRequired(ModuleId),

    /// Quiz submitted for a module without one
    #[error("module {0} has no quiz")]
    NoQuiz(ModuleId),
}

impl ProgressError {
    /// Whether the caller may retry the same call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProgressError::StoreUnavailable(e) if e.is_transient())
    }
}
