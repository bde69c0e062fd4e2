//! Module model - a single unit of training content.

use serde::{Deserialize, Serialize};
use crate::id::{ModuleId, PathId};
use crate::Time;

/// A module is one unit of training content inside a training path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Module {
    /// Unique identifier
    pub id: ModuleId,

    /// Owning training path (`None` = uncategorized)
    #[serde(default)]
    pub path_id: Option<PathId>,

    /// Display title
    pub title: String,

    /// Description
    #[serde(default)]
    pub description: String,

    /// Sequential position within the path, ascending
    pub order_index: i32,

    /// Inactive modules are hidden from learners
    #[serde(default = "default_active")]
    pub is_active: bool,

    /// Embedded quiz
    #[serde(default)]
    pub quiz: Option<ModuleQuiz>,

    /// Created at
    #[serde(default = "chrono::Utc::now")]
    pub created_at: Time,
}

pub(crate) fn default_active() -> bool {
    true
}

impl Module {
    /// Create a new active module in `path_id` at `order_index`.
    pub fn new(path_id: PathId, title: impl Into<String>, order_index: i32) -> Self {
        Self {
            id: ModuleId::new(),
            path_id: Some(path_id),
            title: title.into(),
            description: String::new(),
            order_index,
            is_active: true,
            quiz: None,
            created_at: chrono::Utc::now(),
        }
    }

    /// Attach a quiz.
    pub fn with_quiz(mut self, quiz: ModuleQuiz) -> Self {
        self.quiz = Some(quiz);
        self
    }

    /// Whether completion requires passing the embedded quiz.
    pub fn has_quiz(&self) -> bool {
        self.quiz.as_ref().is_some_and(|q| !q.questions.is_empty())
    }
}

/// A quiz embedded in a module.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleQuiz {
    /// Questions, in presentation order
    pub questions: Vec<QuizQuestion>,
}

impl ModuleQuiz {
    /// Create a quiz from questions.
    pub fn new(questions: Vec<QuizQuestion>) -> Self {
        Self { questions }
    }

    /// Check every question is well formed.
    pub fn validate(&self) -> Result<(), QuizError> {
        self.questions.iter().enumerate().try_for_each(|(i, q)| q.validate(i))
    }
}

/// A multiple choice question with exactly one correct option.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuizQuestion {
    /// Question text
    pub prompt: String,

    /// Answer options
    pub options: Vec<String>,

    /// Index into `options` of the correct answer
    pub correct_index: usize,
}

impl QuizQuestion {
    /// Create a question.
    pub fn new(prompt: impl Into<String>, options: Vec<String>, correct_index: usize) -> Self {
        Self {
            prompt: prompt.into(),
            options,
            correct_index,
        }
    }

    fn validate(&self, index: usize) -> Result<(), QuizError> {
        if self.options.len() < 2 {
            return Err(QuizError::TooFewOptions { question: index });
        }
        if self.correct_index >= self.options.len() {
            return Err(QuizError::CorrectIndexOutOfRange {
                question: index,
                correct_index: self.correct_index,
                options: self.options.len(),
            });
        }
        Ok(())
    }
}

/// A malformed quiz definition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuizError {
    /// Question has fewer than two options
    #[error("question {question} needs at least two options")]
    TooFewOptions {
        /// Question position
        question: usize,
    },

    /// `correct_index` does not point at an option
    #[error("question {question}: correct index {correct_index} out of range for {options} options")]
    CorrectIndexOutOfRange {
        /// Question position
        question: usize,
        /// Offending index
        correct_index: usize,
        /// Number of options
        options: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question(correct: usize) -> QuizQuestion {
        QuizQuestion::new("2 + 2?", vec!["3".into(), "4".into()], correct)
    }

    #[test]
    fn test_quiz_validation() {
        assert!(ModuleQuiz::new(vec![question(1)]).validate().is_ok());
        assert_eq!(
            ModuleQuiz::new(vec![question(0), question(2)]).validate(),
            Err(QuizError::CorrectIndexOutOfRange { question: 1, correct_index: 2, options: 2 })
        );

        let single = QuizQuestion::new("only", vec!["a".into()], 0);
        assert_eq!(
            ModuleQuiz::new(vec![single]).validate(),
            Err(QuizError::TooFewOptions { question: 0 })
        );
    }

    #[test]
    fn test_empty_quiz_does_not_gate_completion() {
        let module = Module::new(PathId::new(), "Intro", 0).with_quiz(ModuleQuiz::default());
        assert!(!module.has_quiz());
        assert!(module.with_quiz(ModuleQuiz::new(vec![question(1)])).has_quiz());
    }

    #[test]
    fn test_module_defaults_when_deserializing() {
        let json = format!(
            r#"{{"id":"{}","title":"Safety basics","order_index":3}}"#,
            ModuleId::new()
        );
        let module: Module = serde_json::from_str(&json).unwrap();
        assert!(module.is_active);
        assert!(module.path_id.is_none());
        assert!(module.quiz.is_none());
    }
}
