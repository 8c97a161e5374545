use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use quiz_core::model::{Answer, AttemptId, QuestionId, Quiz, UserId};
use quiz_core::score::ScoreReport;
use quiz_core::validate;
use storage::snapshot::AnswerSnapshot;

use crate::error::SessionError;

//
// ─── PHASES AND OUTCOME ────────────────────────────────────────────────────────
//

/// Lifecycle phase of a quiz session.
///
/// Constructing a [`QuizSession`] is the not-started → in-progress transition;
/// the pre-start checks (prior attempt, quiz expiry) live in the workflow, so
/// a session in an invalid starting state is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    InProgress,
    Submitting,
    Completed,
    Failed,
}

/// Result of a successful submission, cached for idempotent re-submits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    pub attempt_id: AttemptId,
    pub report: ScoreReport,
    /// Zero-based leaderboard rank; `None` when the entry fell off the capped
    /// board or the leaderboard update lost its merge races.
    pub leaderboard_position: Option<usize>,
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// In-memory state machine for one user's run at a timed quiz.
///
/// Single-threaded by construction: every transition takes `&mut self`, so
/// user actions and timer ticks cannot interleave within a session. All
/// persistence goes through the workflow; this type never touches storage.
pub struct QuizSession {
    quiz: Quiz,
    user_id: UserId,
    user_name: String,
    current: usize,
    answers: BTreeMap<QuestionId, Answer>,
    flagged: BTreeSet<usize>,
    remaining_secs: u32,
    started_at: DateTime<Utc>,
    phase: SessionPhase,
    outcome: Option<SubmitOutcome>,
}

impl QuizSession {
    /// Start a session with the full time budget.
    ///
    /// Callers are expected to go through `QuizFlowService::start_session`,
    /// which performs the prior-attempt and expiry checks first.
    #[must_use]
    pub fn new(
        quiz: Quiz,
        user_id: UserId,
        user_name: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        let remaining_secs = quiz.duration_seconds();
        Self {
            quiz,
            user_id,
            user_name: user_name.into(),
            current: 0,
            answers: BTreeMap::new(),
            flagged: BTreeSet::new(),
            remaining_secs,
            started_at,
            phase: SessionPhase::InProgress,
            outcome: None,
        }
    }

    #[must_use]
    pub fn quiz(&self) -> &Quiz {
        &self.quiz
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
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, Answer> {
        &self.answers
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Seconds elapsed from start to now, per the countdown.
    #[must_use]
    pub fn time_spent_secs(&self) -> u32 {
        self.quiz.duration_seconds() - self.remaining_secs
    }

    #[must_use]
    pub fn is_flagged(&self, index: usize) -> bool {
        self.flagged.contains(&index)
    }

    #[must_use]
    pub fn flagged_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.flagged.iter().copied()
    }

    /// The cached submission outcome, once the session completed.
    #[must_use]
    pub fn outcome(&self) -> Option<&SubmitOutcome> {
        self.outcome.as_ref()
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        if self.phase == SessionPhase::InProgress {
            Ok(())
        } else {
            Err(SessionError::NotInProgress { phase: self.phase })
        }
    }

    fn check_bounds(&self, index: usize) -> Result<(), SessionError> {
        if index < self.quiz.question_count() {
            Ok(())
        } else {
            Err(SessionError::IndexOutOfRange {
                index,
                len: self.quiz.question_count(),
            })
        }
    }

    /// Normalize and store an answer for a question.
    ///
    /// Invalid input is rejected without mutating any state and without
    /// advancing the cursor.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotInProgress` outside the in-progress phase,
    /// `SessionError::UnknownQuestion` for a foreign question id, and
    /// `SessionError::Validation` for input the question type rejects.
    pub fn answer(
        &mut self,
        question_id: &QuestionId,
        raw: &str,
        answered_at: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let question =
            self.quiz
                .question(question_id)
                .ok_or_else(|| SessionError::UnknownQuestion {
                    quiz_id: self.quiz.id().clone(),
                    question_id: question_id.clone(),
                })?;
        let normalized = validate::normalize(question, raw)?;
        self.answers
            .insert(question_id.clone(), Answer::new(normalized, answered_at));
        Ok(())
    }

    /// Mark a question for later review. Flags never affect scoring.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotInProgress` or `SessionError::IndexOutOfRange`.
    pub fn flag(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.check_bounds(index)?;
        self.flagged.insert(index);
        Ok(())
    }

    /// Remove a review mark. Unflagging an unflagged question is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotInProgress` or `SessionError::IndexOutOfRange`.
    pub fn unflag(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.check_bounds(index)?;
        self.flagged.remove(&index);
        Ok(())
    }

    /// Move the navigation cursor.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotInProgress` or `SessionError::IndexOutOfRange`.
    pub fn navigate(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.check_bounds(index)?;
        self.current = index;
        Ok(())
    }

    /// Consume one second of the time budget; driven by the countdown.
    ///
    /// Outside the in-progress phase this is a no-op, so a straggling timer
    /// event cannot mutate a session that already moved on.
    pub fn tick(&mut self) -> u32 {
        if self.phase == SessionPhase::InProgress {
            self.remaining_secs = self.remaining_secs.saturating_sub(1);
        }
        self.remaining_secs
    }

    /// Current answers as an autosave snapshot.
    #[must_use]
    pub fn snapshot(&self, saved_at: DateTime<Utc>) -> AnswerSnapshot {
        AnswerSnapshot::new(self.answers.clone(), saved_at)
    }

    /// Replace the answers with a prior autosave snapshot (resume-after-reload).
    ///
    /// Snapshot entries for questions not in this quiz are dropped.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotInProgress` outside the in-progress phase.
    pub fn restore(&mut self, snapshot: &AnswerSnapshot) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        self.answers = snapshot
            .answers
            .iter()
            .filter(|(id, _)| self.quiz.question(id).is_some())
            .map(|(id, answer)| (id.clone(), answer.clone()))
            .collect();
        Ok(())
    }

    /// Enter the submitting phase.
    ///
    /// Allowed from `InProgress` and from `Failed` (retry after a submission
    /// failure re-runs persistence over the retained answers).
    pub(crate) fn begin_submit(&mut self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::InProgress | SessionPhase::Failed => {
                self.phase = SessionPhase::Submitting;
                Ok(())
            }
            SessionPhase::Submitting | SessionPhase::Completed => {
                Err(SessionError::NotInProgress { phase: self.phase })
            }
        }
    }

    pub(crate) fn complete(&mut self, outcome: SubmitOutcome) {
        self.phase = SessionPhase::Completed;
        self.outcome = Some(outcome);
    }

    pub(crate) fn fail_submit(&mut self) {
        self.phase = SessionPhase::Failed;
    }
}

impl fmt::Debug for QuizSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuizSession")
            .field("quiz_id", self.quiz.id())
            .field("user_id", &self.user_id)
            .field("current", &self.current)
            .field("answers_len", &self.answers.len())
            .field("remaining_secs", &self.remaining_secs)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
