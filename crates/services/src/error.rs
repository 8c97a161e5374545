//! Shared error types for the services crate.

use thiserror::Error;

use quiz_core::model::{QuestionId, QuizId, UserId};
use quiz_core::validate::ValidationError;
use storage::repository::StorageError;

use crate::session::SessionPhase;

/// Errors emitted by the session machine and submission workflow.
///
/// `Validation` is recovered locally and never reaches persistence.
/// `SubmissionFailed` means the attempt was not durably saved; the local
/// snapshot is retained so a retry can recover. `LeaderboardConflict` is the
/// opposite: the attempt IS saved and only the leaderboard update lost its
/// merge races.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionError {
    #[error("quiz {quiz_id} not found")]
    QuizNotFound { quiz_id: QuizId },

    #[error("quiz {quiz_id} deadline has passed")]
    QuizExpired { quiz_id: QuizId },

    #[error("user {user_id} already has an attempt for quiz {quiz_id}")]
    AlreadyAttempted { quiz_id: QuizId, user_id: UserId },

    #[error("question index {index} out of range for {len} questions")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("question {question_id} is not part of quiz {quiz_id}")]
    UnknownQuestion {
        quiz_id: QuizId,
        question_id: QuestionId,
    },

    #[error("operation requires an in-progress session, phase is {phase:?}")]
    NotInProgress { phase: SessionPhase },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(
        "submitting quiz {quiz_id} for user {user_id} failed after {tries} tries; \
         local answers retained"
    )]
    SubmissionFailed {
        quiz_id: QuizId,
        user_id: UserId,
        tries: u32,
        #[source]
        source: StorageError,
    },

    #[error(
        "leaderboard update for quiz {quiz_id} lost {rounds} merge races; \
         the attempt itself is saved"
    )]
    LeaderboardConflict { quiz_id: QuizId, rounds: u32 },

    #[error(transparent)]
    Storage(#[from] StorageError),
}
