use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::QuestionId;

#[derive(Debug, Error, Clone, PartialEq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question points must be positive")]
    ZeroPoints,

    #[error("choice list cannot be empty")]
    NoChoices,

    #[error("expected exactly one correct choice, got {count}")]
    CorrectChoiceCount { count: usize },

    #[error("boolean question requires exactly two choices, got {count}")]
    BooleanChoiceCount { count: usize },

    #[error("numeric correct answer must be finite")]
    NonFiniteAnswer,

    #[error("tolerance must be in (0, 1], got {provided}")]
    InvalidTolerance { provided: f64 },
}

/// One selectable option of a multiple-choice or boolean question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    text: String,
    is_correct: bool,
}

impl Choice {
    #[must_use]
    pub fn new(text: impl Into<String>, is_correct: bool) -> Self {
        Self {
            text: text.into(),
            is_correct,
        }
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn is_correct(&self) -> bool {
        self.is_correct
    }
}

/// Type-specific payload of a question.
///
/// Keeping this a tagged union lets validation and scoring match on it
/// exhaustively instead of branching on a runtime type string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    MultipleChoice {
        choices: Vec<Choice>,
    },
    Boolean {
        choices: Vec<Choice>,
    },
    Text {
        correct_answer: String,
        case_sensitive: bool,
    },
    Number {
        correct_answer: f64,
        tolerance: f64,
    },
}

/// A single quiz question with its point value and answer key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    points: u32,
    kind: QuestionKind,
}

fn validate_choices(choices: &[Choice]) -> Result<(), QuestionError> {
    if choices.is_empty() {
        return Err(QuestionError::NoChoices);
    }
    let count = choices.iter().filter(|c| c.is_correct()).count();
    if count != 1 {
        return Err(QuestionError::CorrectChoiceCount { count });
    }
    Ok(())
}

impl Question {
    /// Build a multiple-choice question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::ZeroPoints` for a zero point value,
    /// `QuestionError::NoChoices` for an empty choice list, and
    /// `QuestionError::CorrectChoiceCount` unless exactly one choice is correct.
    pub fn multiple_choice(
        id: QuestionId,
        text: impl Into<String>,
        points: u32,
        choices: Vec<Choice>,
    ) -> Result<Self, QuestionError> {
        if points == 0 {
            return Err(QuestionError::ZeroPoints);
        }
        validate_choices(&choices)?;
        Ok(Self {
            id,
            text: text.into(),
            points,
            kind: QuestionKind::MultipleChoice { choices },
        })
    }

    /// Build a boolean (true/false style) question.
    ///
    /// # Errors
    ///
    /// As [`Question::multiple_choice`], plus `QuestionError::BooleanChoiceCount`
    /// unless exactly two choices are given.
    pub fn boolean(
        id: QuestionId,
        text: impl Into<String>,
        points: u32,
        choices: Vec<Choice>,
    ) -> Result<Self, QuestionError> {
        if points == 0 {
            return Err(QuestionError::ZeroPoints);
        }
        if choices.len() != 2 {
            return Err(QuestionError::BooleanChoiceCount {
                count: choices.len(),
            });
        }
        validate_choices(&choices)?;
        Ok(Self {
            id,
            text: text.into(),
            points,
            kind: QuestionKind::Boolean { choices },
        })
    }

    /// Build a free-text question.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::ZeroPoints` for a zero point value.
    pub fn text_answer(
        id: QuestionId,
        text: impl Into<String>,
        points: u32,
        correct_answer: impl Into<String>,
        case_sensitive: bool,
    ) -> Result<Self, QuestionError> {
        if points == 0 {
            return Err(QuestionError::ZeroPoints);
        }
        Ok(Self {
            id,
            text: text.into(),
            points,
            kind: QuestionKind::Text {
                correct_answer: correct_answer.into(),
                case_sensitive,
            },
        })
    }

    /// Build a numeric question graded with relative tolerance.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError::ZeroPoints` for a zero point value,
    /// `QuestionError::NonFiniteAnswer` for NaN/infinite answers, and
    /// `QuestionError::InvalidTolerance` when tolerance falls outside (0, 1].
    pub fn numeric(
        id: QuestionId,
        text: impl Into<String>,
        points: u32,
        correct_answer: f64,
        tolerance: f64,
    ) -> Result<Self, QuestionError> {
        if points == 0 {
            return Err(QuestionError::ZeroPoints);
        }
        if !correct_answer.is_finite() {
            return Err(QuestionError::NonFiniteAnswer);
        }
        if !(tolerance > 0.0 && tolerance <= 1.0) {
            return Err(QuestionError::InvalidTolerance {
                provided: tolerance,
            });
        }
        Ok(Self {
            id,
            text: text.into(),
            points,
            kind: QuestionKind::Number {
                correct_answer,
                tolerance,
            },
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuestionId {
        &self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn points(&self) -> u32 {
        self.points
    }

    #[must_use]
    pub fn kind(&self) -> &QuestionKind {
        &self.kind
    }

    /// The single correct choice, for choice-based questions.
    #[must_use]
    pub fn correct_choice(&self) -> Option<&Choice> {
        match &self.kind {
            QuestionKind::MultipleChoice { choices } | QuestionKind::Boolean { choices } => {
                choices.iter().find(|c| c.is_correct())
            }
            QuestionKind::Text { .. } | QuestionKind::Number { .. } => None,
        }
    }
}
