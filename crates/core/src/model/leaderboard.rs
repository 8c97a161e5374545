use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Attempt, QuizId, UserId};

/// Hard cap on leaderboard size; every merge truncates to this.
pub const MAX_ENTRIES: usize = 100;

/// One ranked row of a quiz leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    user_id: UserId,
    user_name: String,
    score: u32,
    time_spent_secs: u32,
    submitted_at: DateTime<Utc>,
    sort_timestamp: i64,
}

impl LeaderboardEntry {
    #[must_use]
    pub fn new(
        user_id: UserId,
        user_name: impl Into<String>,
        score: u32,
        time_spent_secs: u32,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id,
            user_name: user_name.into(),
            score,
            time_spent_secs,
            submitted_at,
            sort_timestamp: submitted_at.timestamp_millis(),
        }
    }

    /// Build the leaderboard row for a finished attempt.
    #[must_use]
    pub fn from_attempt(attempt: &Attempt) -> Self {
        Self::new(
            attempt.user_id().clone(),
            attempt.user_name(),
            attempt.score(),
            attempt.time_spent_secs(),
            attempt.submitted_at(),
        )
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
    pub fn score(&self) -> u32 {
        self.score
    }

    #[must_use]
    pub fn time_spent_secs(&self) -> u32 {
        self.time_spent_secs
    }

    #[must_use]
    pub fn submitted_at(&self) -> DateTime<Utc> {
        self.submitted_at
    }

    #[must_use]
    pub fn sort_timestamp(&self) -> i64 {
        self.sort_timestamp
    }
}

/// Ranked, capped leaderboard for one quiz.
///
/// Invariants held after every merge: at most [`MAX_ENTRIES`] rows, at most
/// one row per user, sorted by score descending with elapsed time ascending
/// as the tie-break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardDocument {
    quiz_id: QuizId,
    entries: Vec<LeaderboardEntry>,
    last_updated: DateTime<Utc>,
}

impl LeaderboardDocument {
    /// Create the first document for a quiz from a single entry.
    #[must_use]
    pub fn initial(quiz_id: QuizId, entry: LeaderboardEntry, now: DateTime<Utc>) -> Self {
        Self {
            quiz_id,
            entries: vec![entry],
            last_updated: now,
        }
    }

    /// Rehydrate a document from persisted parts without re-sorting.
    #[must_use]
    pub fn from_persisted(
        quiz_id: QuizId,
        entries: Vec<LeaderboardEntry>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        Self {
            quiz_id,
            entries,
            last_updated,
        }
    }

    /// Fold a new entry into the ranking.
    ///
    /// Any prior entry for the same user is replaced. The sort is stable, so
    /// rows equal on (score, time) keep their existing relative order and the
    /// incoming entry lands after equal incumbents.
    pub fn merge(&mut self, entry: LeaderboardEntry, now: DateTime<Utc>) {
        self.entries.retain(|e| e.user_id() != entry.user_id());
        self.entries.push(entry);
        self.entries.sort_by(|a, b| {
            b.score()
                .cmp(&a.score())
                .then(a.time_spent_secs().cmp(&b.time_spent_secs()))
        });
        self.entries.truncate(MAX_ENTRIES);
        self.last_updated = now;
    }

    #[must_use]
    pub fn quiz_id(&self) -> &QuizId {
        &self.quiz_id
    }

    #[must_use]
    pub fn entries(&self) -> &[LeaderboardEntry] {
        &self.entries
    }

    #[must_use]
    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    /// Zero-based rank of a user, if present.
    #[must_use]
    pub fn position_of(&self, user_id: &UserId) -> Option<usize> {
        self.entries.iter().position(|e| e.user_id() == user_id)
    }
}
