use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use crate::model::{Question, QuestionId, QuizId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz must contain at least one question")]
    NoQuestions,

    #[error("quiz duration must be positive")]
    ZeroDuration,

    #[error("duplicate question id: {id}")]
    DuplicateQuestionId { id: QuestionId },
}

/// Where a quiz definition originates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizKind {
    Internal,
    External,
}

/// A timed quiz definition. Immutable once an attempt starts; every field is
/// read through accessors and nothing here mutates after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    id: QuizId,
    title: String,
    duration_minutes: u32,
    questions: Vec<Question>,
    end_time: DateTime<Utc>,
    kind: QuizKind,
}

impl Quiz {
    /// Build a quiz from an ordered question list.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::NoQuestions` for an empty question list,
    /// `QuizError::ZeroDuration` for a zero duration, and
    /// `QuizError::DuplicateQuestionId` when two questions share an id.
    pub fn new(
        id: QuizId,
        title: impl Into<String>,
        duration_minutes: u32,
        questions: Vec<Question>,
        end_time: DateTime<Utc>,
        kind: QuizKind,
    ) -> Result<Self, QuizError> {
        if questions.is_empty() {
            return Err(QuizError::NoQuestions);
        }
        if duration_minutes == 0 {
            return Err(QuizError::ZeroDuration);
        }
        let mut seen = HashSet::new();
        for question in &questions {
            if !seen.insert(question.id().clone()) {
                return Err(QuizError::DuplicateQuestionId {
                    id: question.id().clone(),
                });
            }
        }

        Ok(Self {
            id,
            title: title.into(),
            duration_minutes,
            questions,
            end_time,
            kind,
        })
    }

    #[must_use]
    pub fn id(&self) -> &QuizId {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn duration_minutes(&self) -> u32 {
        self.duration_minutes
    }

    /// Full time budget for an attempt, in seconds.
    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_minutes * 60
    }

    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    #[must_use]
    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    #[must_use]
    pub fn question(&self, id: &QuestionId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id() == id)
    }

    #[must_use]
    pub fn question_at(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    #[must_use]
    pub fn kind(&self) -> QuizKind {
        self.kind
    }

    /// Sum of all question point values.
    #[must_use]
    pub fn total_points(&self) -> u32 {
        self.questions.iter().map(Question::points).sum()
    }

    /// Whether the absolute deadline has passed.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.end_time
    }
}
