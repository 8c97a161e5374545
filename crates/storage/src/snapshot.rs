//! Local autosave cache for in-progress answers.
//!
//! Snapshots are keyed by (quiz, user) and survive a reload of the consuming
//! client; the session layer restores them on start and clears them only
//! after a successful submission.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use quiz_core::model::{Answer, QuestionId, QuizId, UserId};

use crate::repository::StorageError;

/// The autosaved answers of one in-progress session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerSnapshot {
    pub answers: BTreeMap<QuestionId, Answer>,
    pub saved_at: DateTime<Utc>,
}

impl AnswerSnapshot {
    #[must_use]
    pub fn new(answers: BTreeMap<QuestionId, Answer>, saved_at: DateTime<Utc>) -> Self {
        Self { answers, saved_at }
    }

    #[must_use]
    pub fn empty(saved_at: DateTime<Utc>) -> Self {
        Self {
            answers: BTreeMap::new(),
            saved_at,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

/// Scope of one snapshot: a single user's run at a single quiz.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
    pub quiz_id: QuizId,
    pub user_id: UserId,
}

impl SnapshotKey {
    #[must_use]
    pub fn new(quiz_id: QuizId, user_id: UserId) -> Self {
        Self { quiz_id, user_id }
    }

    fn file_name(&self) -> String {
        // Ids may contain path separators; keep only filename-safe characters.
        let sanitize = |s: &str| {
            s.chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
                .collect::<String>()
        };
        format!(
            "{}__{}.json",
            sanitize(self.quiz_id.as_str()),
            sanitize(self.user_id.as_str())
        )
    }
}

/// Durable local store for autosave snapshots.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Persist (overwrite) the snapshot for the key.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the snapshot cannot be written.
    async fn save(&self, key: &SnapshotKey, snapshot: &AnswerSnapshot)
    -> Result<(), StorageError>;

    /// Fetch the snapshot for the key, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or parse failure; absence is `Ok(None)`.
    async fn load(&self, key: &SnapshotKey) -> Result<Option<AnswerSnapshot>, StorageError>;

    /// Remove the snapshot for the key. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the removal fails.
    async fn clear(&self, key: &SnapshotKey) -> Result<(), StorageError>;
}

/// In-memory snapshot store for tests and prototyping.
#[derive(Clone, Default)]
pub struct InMemorySnapshotStore {
    snapshots: Arc<Mutex<HashMap<SnapshotKey, AnswerSnapshot>>>,
}

impl InMemorySnapshotStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(
        &self,
        key: &SnapshotKey,
        snapshot: &AnswerSnapshot,
    ) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.insert(key.clone(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, key: &SnapshotKey) -> Result<Option<AnswerSnapshot>, StorageError> {
        let guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        Ok(guard.get(key).cloned())
    }

    async fn clear(&self, key: &SnapshotKey) -> Result<(), StorageError> {
        let mut guard = self
            .snapshots
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        guard.remove(key);
        Ok(())
    }
}

/// Snapshot store writing one JSON file per key under a directory.
#[derive(Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &SnapshotKey) -> PathBuf {
        self.dir.join(key.file_name())
    }

    fn io_err(e: std::io::Error) -> StorageError {
        StorageError::Connection(e.to_string())
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(
        &self,
        key: &SnapshotKey,
        snapshot: &AnswerSnapshot,
    ) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(Self::io_err)?;
        let json = serde_json::to_string_pretty(snapshot)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        std::fs::write(self.path_for(key), json).map_err(Self::io_err)
    }

    async fn load(&self, key: &SnapshotKey) -> Result<Option<AnswerSnapshot>, StorageError> {
        let path = self.path_for(key);
        let json = match std::fs::read_to_string(&path) {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_err(e)),
        };
        serde_json::from_str(&json)
            .map(Some)
            .map_err(|e| StorageError::Serialization(e.to_string()))
    }

    async fn clear(&self, key: &SnapshotKey) -> Result<(), StorageError> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Self::io_err(e)),
        }
    }
}
