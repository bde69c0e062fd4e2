//! trainpath core data models.
//!
//! This crate defines the data structures shared by the training path
//! storage backends and the sequential unlocking engine.

#![warn(missing_docs)]

// Core identities
mod id;

// Catalog
mod module;
mod path;

// Learner state
mod progress;
mod access;

// Re-exports
pub use id::*;

pub use module::{Module, ModuleQuiz, QuizQuestion, QuizError};
pub use path::{TrainingPath, CapstoneQuiz};
pub use progress::{ProgressStatus, ProgressRecord, ProgressUpdate, PathProgressRecord};
pub use access::{AccessStatus, PathSummary};

/// Timestamp type
pub type Time = chrono::DateTime<chrono::Utc>;
