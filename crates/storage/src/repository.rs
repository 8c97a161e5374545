use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use quiz_core::model::{Attempt, AttemptId, LeaderboardDocument, Quiz, QuizId, UserId};

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("version conflict")]
    Conflict,

    #[error("already exists")]
    AlreadyExists,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A leaderboard document together with the version its read observed.
///
/// The version is the compare-and-swap token for [`LeaderboardRepository::put_leaderboard`];
/// writers hand it back unchanged so a concurrent update turns into a
/// `Conflict` instead of a silent overwrite.
#[derive(Debug, Clone)]
pub struct VersionedLeaderboard {
    pub document: LeaderboardDocument,
    pub version: u64,
}

/// Repository contract for quiz definitions.
#[async_trait]
pub trait QuizRepository: Send + Sync {
    /// Persist or update a quiz definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the quiz cannot be stored.
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError>;

    /// Fetch a quiz by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing, or other storage errors.
    async fn get_quiz(&self, id: &QuizId) -> Result<Quiz, StorageError>;
}

/// Repository contract for attempts and the per-user completion counter.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// Fetch a user's attempt for a quiz, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure; absence is `Ok(None)`.
    async fn get_attempt(
        &self,
        quiz_id: &QuizId,
        user_id: &UserId,
    ) -> Result<Option<Attempt>, StorageError>;

    /// Store a new attempt, exactly one per (quiz, user).
    ///
    /// # Errors
    ///
    /// Returns `StorageError::AlreadyExists` when an attempt for the same
    /// (quiz, user) pair is already stored, or other storage errors.
    async fn insert_attempt(&self, attempt: &Attempt) -> Result<AttemptId, StorageError>;

    /// Bump the user's completed-quiz counter by `delta`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn record_progress(&self, user_id: &UserId, delta: i64) -> Result<(), StorageError>;

    /// Current value of the user's completion counter (0 when unset).
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure.
    async fn get_progress(&self, user_id: &UserId) -> Result<i64, StorageError>;
}

/// Repository contract for the shared per-quiz leaderboard document.
#[async_trait]
pub trait LeaderboardRepository: Send + Sync {
    /// Fetch the current leaderboard and its version, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on storage failure; absence is `Ok(None)`.
    async fn get_leaderboard(
        &self,
        quiz_id: &QuizId,
    ) -> Result<Option<VersionedLeaderboard>, StorageError>;

    /// Write the leaderboard, guarded by the version the caller read.
    ///
    /// `expected_version` is `None` when the caller observed no document.
    /// Returns the new version on success.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` when the stored version no longer
    /// matches, or other storage errors.
    async fn put_leaderboard(
        &self,
        document: &LeaderboardDocument,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError>;
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    quizzes: Arc<Mutex<HashMap<QuizId, Quiz>>>,
    attempts: Arc<Mutex<HashMap<(QuizId, UserId), (AttemptId, Attempt)>>>,
    leaderboards: Arc<Mutex<HashMap<QuizId, (LeaderboardDocument, u64)>>>,
    progress: Arc<Mutex<HashMap<UserId, i64>>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuizRepository for InMemoryRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let mut guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(quiz.id().clone(), quiz.clone());
        Ok(())
    }

    async fn get_quiz(&self, id: &QuizId) -> Result<Quiz, StorageError> {
        let guard = self
            .quizzes
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.get(id).cloned().ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn get_attempt(
        &self,
        quiz_id: &QuizId,
        user_id: &UserId,
    ) -> Result<Option<Attempt>, StorageError> {
        let guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard
            .get(&(quiz_id.clone(), user_id.clone()))
            .map(|(_, attempt)| attempt.clone()))
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<AttemptId, StorageError> {
        let mut guard = self
            .attempts
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let key = (attempt.quiz_id().clone(), attempt.user_id().clone());
        if guard.contains_key(&key) {
            return Err(StorageError::AlreadyExists);
        }
        let id = AttemptId::generate();
        guard.insert(key, (id.clone(), attempt.clone()));
        Ok(id)
    }

    async fn record_progress(&self, user_id: &UserId, delta: i64) -> Result<(), StorageError> {
        let mut guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        *guard.entry(user_id.clone()).or_insert(0) += delta;
        Ok(())
    }

    async fn get_progress(&self, user_id: &UserId) -> Result<i64, StorageError> {
        let guard = self
            .progress
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(user_id).copied().unwrap_or(0))
    }
}

#[async_trait]
impl LeaderboardRepository for InMemoryRepository {
    async fn get_leaderboard(
        &self,
        quiz_id: &QuizId,
    ) -> Result<Option<VersionedLeaderboard>, StorageError> {
        let guard = self
            .leaderboards
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(quiz_id).map(|(document, version)| {
            VersionedLeaderboard {
                document: document.clone(),
                version: *version,
            }
        }))
    }

    async fn put_leaderboard(
        &self,
        document: &LeaderboardDocument,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        let mut guard = self
            .leaderboards
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let current = guard.get(document.quiz_id()).map(|(_, v)| *v);
        match (current, expected_version) {
            (None, None) => {
                guard.insert(document.quiz_id().clone(), (document.clone(), 1));
                Ok(1)
            }
            (Some(actual), Some(expected)) if actual == expected => {
                let next = actual + 1;
                guard.insert(document.quiz_id().clone(), (document.clone(), next));
                Ok(next)
            }
            _ => Err(StorageError::Conflict),
        }
    }
}

/// Aggregates the gateway repositories behind trait objects for easy backend
/// swapping.
#[derive(Clone)]
pub struct Storage {
    pub quizzes: Arc<dyn QuizRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub leaderboards: Arc<dyn LeaderboardRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        let quizzes: Arc<dyn QuizRepository> = Arc::new(repo.clone());
        let attempts: Arc<dyn AttemptRepository> = Arc::new(repo.clone());
        let leaderboards: Arc<dyn LeaderboardRepository> = Arc::new(repo);
        Self {
            quizzes,
            attempts,
            leaderboards,
        }
    }
}
