use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::model::{QuestionId, QuizId, UserId};

/// A single stored answer: the normalized value plus the client timestamp of
/// the last edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    value: String,
    answered_at: DateTime<Utc>,
}

impl Answer {
    #[must_use]
    pub fn new(value: impl Into<String>, answered_at: DateTime<Utc>) -> Self {
        Self {
            value: value.into(),
            answered_at,
        }
    }

    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn answered_at(&self) -> DateTime<Utc> {
        self.answered_at
    }
}

/// One user's completed run through a quiz.
///
/// Created exactly once per (quiz, user) pair; the session machine refuses a
/// second start and the attempt repository enforces the same uniqueness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    quiz_id: QuizId,
    user_id: UserId,
    user_name: String,
    answers: BTreeMap<QuestionId, Answer>,
    time_spent_secs: u32,
    score: u32,
    submitted_at: DateTime<Utc>,
}

impl Attempt {
    #[must_use]
    pub fn new(
        quiz_id: QuizId,
        user_id: UserId,
        user_name: impl Into<String>,
        answers: BTreeMap<QuestionId, Answer>,
        time_spent_secs: u32,
        score: u32,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            quiz_id,
            user_id,
            user_name: user_name.into(),
            answers,
            time_spent_secs,
            score,
            submitted_at,
        }
    }

    #[must_use]
    pub fn quiz_id(&self) -> &QuizId {
        &self.quiz_id
    }

    #[must_use]
    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    #[must_use]
    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Answer> {
        &self.answers
    }

    #[must_use]
    pub fn time_spent_secs(&self) -> u32 {
        self.time_spent_secs
    }

    #[must_use]
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }
}
