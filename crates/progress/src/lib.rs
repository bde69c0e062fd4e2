//! Learning-path progress engine.
//!
//! Sequential module unlocking, path completion summaries, module quiz
//! scoring and the capstone quiz gate, all on top of the storage traits.

#![warn(missing_docs)]

pub mod access;
pub mod capstone;
pub mod config;
pub mod error;
pub mod quiz;
pub mod retry;
pub mod summary;
pub mod watcher;

pub use access::{compute_access, AccessSnapshot, PathAccessEngine};
pub use capstone::{CapstoneAvailability, CapstoneGate, CapstoneOutcome, CapstoneSubmission};
pub use config::{ProgressConfig, DEFAULT_PASSING_SCORE};
pub use error::{ProgressError, Result};
pub use quiz::{score_answers, ModuleProgress, QuizOutcome, QuizScore};
pub use retry::with_retry;
pub use summary::{round_percent, summarize_modules, PathProgressSummary};
pub use watcher::AccessWatcher;
