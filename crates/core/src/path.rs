//! Training path model - an ordered curriculum track.

use serde::{Deserialize, Serialize};
use crate::id::PathId;
use crate::module::{default_active, QuizQuestion};

/// A named, ordered collection of modules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingPath {
    /// Unique identifier
    pub id: PathId,

    /// Display name
    pub name: String,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Position among paths
    #[serde(default)]
    pub order_index: i32,

    /// Inactive paths are hidden from learners
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Final assessment gated on completing every module
    #[serde(default)]
    pub capstone: Option<CapstoneQuiz>,
}

impl TrainingPath {
    /// Create a new active path.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: PathId::new(),
            name: name.into(),
            description: String::new(),
            order_index: 0,
            is_active: true,
            capstone: None,
        }
    }

    /// Attach a capstone quiz.
    pub fn with_capstone(mut self, capstone: CapstoneQuiz) -> Self {
        self.capstone = Some(capstone);
        self
    }
}

/// Path-level final quiz.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapstoneQuiz {
    /// Display title
    pub title: String,

    /// Questions
    pub questions: Vec<QuizQuestion>,

    /// Minimum score (0-100) to pass
    #[serde(default = "default_passing_score")]
    pub passing_score: u8,

    /// Maximum number of attempts
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_passing_score() -> u8 {
    70
}

fn default_max_attempts() -> u32 {
    3
}

impl CapstoneQuiz {
    /// Create a capstone quiz with default threshold and attempt limit.
    pub fn new(title: impl Into<String>, questions: Vec<QuizQuestion>) -> Self {
        Self {
            title: title.into(),
            questions,
            passing_score: default_passing_score(),
            max_attempts: default_max_attempts(),
        }
    }
}
