#![forbid(unsafe_code)]

pub mod repository;
pub mod snapshot;
pub mod sqlite;

pub use repository::{
    AttemptRepository, InMemoryRepository, LeaderboardRepository, QuizRepository, Storage,
    StorageError, VersionedLeaderboard,
};
pub use snapshot::{AnswerSnapshot, FileSnapshotStore, InMemorySnapshotStore, SnapshotKey, SnapshotStore};
