use std::sync::Arc;
use std::time::Duration;

use log::warn;

use quiz_core::Clock;
use quiz_core::model::{Attempt, AttemptId, LeaderboardDocument, LeaderboardEntry, QuizId, UserId};
use quiz_core::score;
use storage::repository::{
    AttemptRepository, LeaderboardRepository, QuizRepository, Storage, StorageError,
};
use storage::snapshot::{SnapshotKey, SnapshotStore};

use crate::error::SessionError;
use crate::session::{QuizSession, SubmitOutcome};

/// Bounded retry budget for persisting the attempt itself.
const SAVE_ATTEMPT_TRIES: u32 = 3;
const SAVE_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);

/// Bounded re-fetch/re-merge rounds for the leaderboard compare-and-swap.
const LEADERBOARD_MERGE_ROUNDS: u32 = 3;

/// A freshly started session, noting whether autosaved answers were restored.
#[derive(Debug)]
pub struct StartedSession {
    pub session: QuizSession,
    pub resumed: bool,
}

/// Orchestrates session start and submission against the persistence gateway.
///
/// Manual submission and countdown-driven auto-submission both go through
/// [`QuizFlowService::submit`]; there is no second scoring codepath.
#[derive(Clone)]
pub struct QuizFlowService {
    clock: Clock,
    quizzes: Arc<dyn QuizRepository>,
    attempts: Arc<dyn AttemptRepository>,
    leaderboards: Arc<dyn LeaderboardRepository>,
    snapshots: Arc<dyn SnapshotStore>,
}

impl QuizFlowService {
    #[must_use]
    pub fn new(
        clock: Clock,
        quizzes: Arc<dyn QuizRepository>,
        attempts: Arc<dyn AttemptRepository>,
        leaderboards: Arc<dyn LeaderboardRepository>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        Self {
            clock,
            quizzes,
            attempts,
            leaderboards,
            snapshots,
        }
    }

    /// Convenience constructor over a [`Storage`] aggregate.
    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage, snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.quizzes),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.leaderboards),
            snapshots,
        )
    }

    fn snapshot_key(quiz_id: &QuizId, user_id: &UserId) -> SnapshotKey {
        SnapshotKey::new(quiz_id.clone(), user_id.clone())
    }

    /// Start a session for a quiz, restoring any local autosave snapshot.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::QuizNotFound` for an unknown quiz,
    /// `SessionError::QuizExpired` when the deadline has passed,
    /// `SessionError::AlreadyAttempted` when a completed attempt exists, and
    /// `SessionError::Storage` for gateway failures.
    pub async fn start_session(
        &self,
        quiz_id: &QuizId,
        user_id: &UserId,
        user_name: &str,
    ) -> Result<StartedSession, SessionError> {
        let quiz = match self.quizzes.get_quiz(quiz_id).await {
            Ok(quiz) => quiz,
            Err(StorageError::NotFound) => {
                return Err(SessionError::QuizNotFound {
                    quiz_id: quiz_id.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let now = self.clock.now();
        if quiz.is_expired(now) {
            return Err(SessionError::QuizExpired {
                quiz_id: quiz_id.clone(),
            });
        }

        if self.attempts.get_attempt(quiz_id, user_id).await?.is_some() {
            return Err(SessionError::AlreadyAttempted {
                quiz_id: quiz_id.clone(),
                user_id: user_id.clone(),
            });
        }

        let mut session = QuizSession::new(quiz, user_id.clone(), user_name, now);

        // A broken local snapshot must not block starting; resume is
        // best-effort.
        let key = Self::snapshot_key(quiz_id, user_id);
        let resumed = match self.snapshots.load(&key).await {
            Ok(Some(snapshot)) if !snapshot.is_empty() => {
                session.restore(&snapshot)?;
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!("loading autosave for quiz {quiz_id} failed: {e}");
                false
            }
        };

        Ok(StartedSession { session, resumed })
    }

    /// Submit the session: score, persist the attempt, publish to the
    /// leaderboard, bump the progress counter.
    ///
    /// Idempotent: once the session holds an outcome, calling again returns
    /// it without touching persistence, so an auto-submit racing a manual
    /// submit (or a double-click) yields exactly one attempt and one
    /// leaderboard entry.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::SubmissionFailed` when the attempt could not be
    /// saved after bounded retries (phase becomes `Failed`, local answers are
    /// retained, and calling again retries persistence). Returns
    /// `SessionError::LeaderboardConflict` (or `Storage`) for leaderboard
    /// failures after the attempt is already durably saved; the session still
    /// completes.
    pub async fn submit(&self, session: &mut QuizSession) -> Result<SubmitOutcome, SessionError> {
        if let Some(prior) = session.outcome() {
            return Ok(prior.clone());
        }
        session.begin_submit()?;

        let now = self.clock.now();
        let report = score::score(session.quiz(), session.answers());
        let attempt = Attempt::new(
            session.quiz().id().clone(),
            session.user_id().clone(),
            session.user_name(),
            session.answers().clone(),
            session.time_spent_secs(),
            report.total,
            now,
        );

        let attempt_id = match self.save_attempt_with_retry(&attempt).await {
            Ok(id) => id,
            Err(e) => {
                // Not durable: keep the snapshot so a retry can recover.
                session.fail_submit();
                return Err(e);
            }
        };

        let key = Self::snapshot_key(attempt.quiz_id(), attempt.user_id());
        if let Err(e) = self.snapshots.clear(&key).await {
            warn!("clearing autosave for quiz {} failed: {e}", attempt.quiz_id());
        }

        self.spawn_progress_update(attempt.user_id().clone());

        match self.publish_to_leaderboard(&attempt, now).await {
            Ok(position) => {
                let outcome = SubmitOutcome {
                    attempt_id,
                    report,
                    leaderboard_position: position,
                };
                session.complete(outcome.clone());
                Ok(outcome)
            }
            Err(e) => {
                // The attempt is saved; a leaderboard failure never reads as
                // a failed submission.
                session.complete(SubmitOutcome {
                    attempt_id,
                    report,
                    leaderboard_position: None,
                });
                Err(e)
            }
        }
    }

    async fn save_attempt_with_retry(&self, attempt: &Attempt) -> Result<AttemptId, SessionError> {
        let mut delay = SAVE_RETRY_BASE_DELAY;
        let mut last_err = StorageError::Connection("attempt save never ran".into());

        for try_no in 1..=SAVE_ATTEMPT_TRIES {
            match self.attempts.insert_attempt(attempt).await {
                Ok(id) => return Ok(id),
                Err(StorageError::AlreadyExists) => {
                    return Err(SessionError::AlreadyAttempted {
                        quiz_id: attempt.quiz_id().clone(),
                        user_id: attempt.user_id().clone(),
                    });
                }
                Err(e) => {
                    warn!(
                        "saving attempt for quiz {} try {try_no}/{SAVE_ATTEMPT_TRIES} failed: {e}",
                        attempt.quiz_id()
                    );
                    last_err = e;
                    if try_no < SAVE_ATTEMPT_TRIES {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(SessionError::SubmissionFailed {
            quiz_id: attempt.quiz_id().clone(),
            user_id: attempt.user_id().clone(),
            tries: SAVE_ATTEMPT_TRIES,
            source: last_err,
        })
    }

    /// Optimistic-concurrency loop around the pure leaderboard merge.
    ///
    /// Each round re-fetches the document, re-runs the merge, and writes with
    /// the observed version; a `Conflict` means another submitter won the
    /// race and the round repeats against their result.
    async fn publish_to_leaderboard(
        &self,
        attempt: &Attempt,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<usize>, SessionError> {
        let entry = LeaderboardEntry::from_attempt(attempt);

        for round in 1..=LEADERBOARD_MERGE_ROUNDS {
            let (document, expected_version) =
                match self.leaderboards.get_leaderboard(attempt.quiz_id()).await? {
                    Some(current) => {
                        let mut document = current.document;
                        document.merge(entry.clone(), now);
                        (document, Some(current.version))
                    }
                    None => (
                        LeaderboardDocument::initial(attempt.quiz_id().clone(), entry.clone(), now),
                        None,
                    ),
                };

            match self
                .leaderboards
                .put_leaderboard(&document, expected_version)
                .await
            {
                Ok(_) => return Ok(document.position_of(attempt.user_id())),
                Err(StorageError::Conflict) => {
                    warn!(
                        "leaderboard merge for quiz {} lost race {round}/{LEADERBOARD_MERGE_ROUNDS}",
                        attempt.quiz_id()
                    );
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(SessionError::LeaderboardConflict {
            quiz_id: attempt.quiz_id().clone(),
            rounds: LEADERBOARD_MERGE_ROUNDS,
        })
    }

    /// Fire-and-forget completion counter; failure never rolls back a saved
    /// attempt.
    fn spawn_progress_update(&self, user_id: UserId) {
        let attempts = Arc::clone(&self.attempts);
        tokio::spawn(async move {
            if let Err(e) = attempts.record_progress(&user_id, 1).await {
                warn!("progress update for user {user_id} failed: {e}");
            }
        });
    }
}
