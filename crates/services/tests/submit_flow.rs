use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use chrono::Duration;
use quiz_core::model::{
    Answer, Attempt, AttemptId, Choice, LeaderboardDocument, LeaderboardEntry, Question,
    QuestionId, Quiz, QuizId, QuizKind, UserId,
};
use quiz_core::time::{fixed_now, fixed_clock};
use quiz_core::Clock;
use services::{
    Countdown, CountdownEvent, QuizFlowService, SessionError, SessionPhase,
};
use storage::repository::{
    AttemptRepository, InMemoryRepository, LeaderboardRepository, QuizRepository, StorageError,
};
use storage::snapshot::{AnswerSnapshot, InMemorySnapshotStore, SnapshotKey, SnapshotStore};

fn build_quiz(id: &str) -> Quiz {
    let questions = vec![
        Question::multiple_choice(
            QuestionId::new("q1"),
            "Capital of France?",
            1,
            vec![Choice::new("Paris", true), Choice::new("Lyon", false)],
        )
        .unwrap(),
        Question::multiple_choice(
            QuestionId::new("q2"),
            "Largest planet?",
            1,
            vec![Choice::new("Jupiter", true), Choice::new("Mars", false)],
        )
        .unwrap(),
    ];
    Quiz::new(
        QuizId::new(id),
        "Basics",
        10,
        questions,
        fixed_now() + Duration::hours(1),
        QuizKind::Internal,
    )
    .unwrap()
}

async fn seeded(
    quiz: &Quiz,
) -> (InMemoryRepository, Arc<InMemorySnapshotStore>, QuizFlowService) {
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(quiz).await.unwrap();
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let service = QuizFlowService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        snapshots.clone(),
    );
    (repo, snapshots, service)
}

async fn settle() {
    // Let fire-and-forget tasks run.
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn full_flow_scores_persists_and_ranks() {
    let quiz = build_quiz("quiz-1");
    let (repo, snapshots, service) = seeded(&quiz).await;
    let user = UserId::new("u1");

    let started = service.start_session(quiz.id(), &user, "Dana").await.unwrap();
    let mut session = started.session;
    assert!(!started.resumed);

    session
        .answer(&QuestionId::new("q1"), "Paris", fixed_now())
        .unwrap();
    for _ in 0..200 {
        session.tick();
    }

    let outcome = service.submit(&mut session).await.unwrap();
    settle().await;

    assert_eq!(session.phase(), SessionPhase::Completed);
    assert_eq!(outcome.report.total, 1);
    assert!(outcome.report.per_question[0].correct);
    assert_eq!(outcome.report.per_question[0].points_awarded, 1);
    assert!(!outcome.report.per_question[1].correct);
    assert_eq!(outcome.report.per_question[1].points_awarded, 0);
    assert_eq!(outcome.leaderboard_position, Some(0));

    let attempt = repo
        .get_attempt(quiz.id(), &user)
        .await
        .unwrap()
        .expect("attempt saved");
    assert_eq!(attempt.score(), 1);
    assert_eq!(attempt.time_spent_secs(), 200);

    let board = repo.get_leaderboard(quiz.id()).await.unwrap().unwrap();
    assert_eq!(board.document.entries().len(), 1);
    assert_eq!(board.document.entries()[0].user_id(), &user);

    let key = SnapshotKey::new(quiz.id().clone(), user.clone());
    assert!(snapshots.load(&key).await.unwrap().is_none());
    assert_eq!(repo.get_progress(&user).await.unwrap(), 1);
}

#[tokio::test]
async fn double_submit_yields_one_attempt_and_one_entry() {
    let quiz = build_quiz("quiz-1");
    let (repo, _snapshots, service) = seeded(&quiz).await;
    let user = UserId::new("u1");

    let mut session = service
        .start_session(quiz.id(), &user, "Dana")
        .await
        .unwrap()
        .session;
    session
        .answer(&QuestionId::new("q1"), "Paris", fixed_now())
        .unwrap();

    let first = service.submit(&mut session).await.unwrap();
    let second = service.submit(&mut session).await.unwrap();
    settle().await;

    assert_eq!(first, second);
    let board = repo.get_leaderboard(quiz.id()).await.unwrap().unwrap();
    assert_eq!(board.document.entries().len(), 1);
    assert_eq!(board.version, 1);
}

#[tokio::test]
async fn second_session_for_attempted_quiz_is_rejected() {
    let quiz = build_quiz("quiz-1");
    let (_repo, _snapshots, service) = seeded(&quiz).await;
    let user = UserId::new("u1");

    let mut session = service
        .start_session(quiz.id(), &user, "Dana")
        .await
        .unwrap()
        .session;
    service.submit(&mut session).await.unwrap();
    settle().await;

    let err = service
        .start_session(quiz.id(), &user, "Dana")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyAttempted { .. }));
}

#[tokio::test]
async fn expired_and_missing_quizzes_do_not_start() {
    let quiz = build_quiz("quiz-1");
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(&quiz).await.unwrap();
    let service = QuizFlowService::new(
        Clock::fixed(quiz.end_time() + Duration::seconds(1)),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        Arc::new(InMemorySnapshotStore::new()),
    );

    let err = service
        .start_session(quiz.id(), &UserId::new("u1"), "Dana")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::QuizExpired { .. }));

    let err = service
        .start_session(&QuizId::new("missing"), &UserId::new("u1"), "Dana")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::QuizNotFound { .. }));
}

#[tokio::test]
async fn resume_restores_exactly_the_autosaved_answers() {
    let quiz = build_quiz("quiz-1");
    let (_repo, snapshots, service) = seeded(&quiz).await;
    let user = UserId::new("u1");

    let mut answers = BTreeMap::new();
    answers.insert(QuestionId::new("q1"), Answer::new("Paris", fixed_now()));
    let key = SnapshotKey::new(quiz.id().clone(), user.clone());
    snapshots
        .save(&key, &AnswerSnapshot::new(answers.clone(), fixed_now()))
        .await
        .unwrap();

    let started = service.start_session(quiz.id(), &user, "Dana").await.unwrap();
    assert!(started.resumed);
    assert_eq!(started.session.answers(), &answers);
}

#[tokio::test]
async fn auto_submit_and_manual_submit_share_one_codepath() {
    let quiz = build_quiz("quiz-1");
    let (_repo, _snapshots, service) = seeded(&quiz).await;

    // Manual submitter.
    let mut manual = service
        .start_session(quiz.id(), &UserId::new("manual"), "Manual")
        .await
        .unwrap()
        .session;
    manual
        .answer(&QuestionId::new("q1"), "Paris", fixed_now())
        .unwrap();
    let manual_outcome = service.submit(&mut manual).await.unwrap();

    // Auto submitter: countdown runs to zero, expiry triggers submit().
    let mut auto = service
        .start_session(quiz.id(), &UserId::new("auto"), "Auto")
        .await
        .unwrap()
        .session;
    auto.answer(&QuestionId::new("q1"), "Paris", fixed_now())
        .unwrap();

    let mut countdown = Countdown::new(auto.remaining_secs());
    let auto_outcome = loop {
        let events = countdown.tick();
        auto.tick();
        if events.contains(&CountdownEvent::Expired) {
            break service.submit(&mut auto).await.unwrap();
        }
    };
    settle().await;

    assert_eq!(manual_outcome.report, auto_outcome.report);
    assert_eq!(auto.phase(), SessionPhase::Completed);
    assert_eq!(auto.time_spent_secs(), quiz.duration_seconds());
}

//
// ─── FAILURE INJECTION ─────────────────────────────────────────────────────────
//

/// Attempt repository that fails the first `failures` inserts.
struct FlakyAttempts {
    inner: InMemoryRepository,
    failures: AtomicU32,
}

#[async_trait]
impl AttemptRepository for FlakyAttempts {
    async fn get_attempt(
        &self,
        quiz_id: &QuizId,
        user_id: &UserId,
    ) -> Result<Option<Attempt>, StorageError> {
        self.inner.get_attempt(quiz_id, user_id).await
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<AttemptId, StorageError> {
        if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
            (f > 0).then(|| f - 1)
        }).is_ok()
        {
            return Err(StorageError::Connection("simulated outage".into()));
        }
        self.inner.insert_attempt(attempt).await
    }

    async fn record_progress(&self, user_id: &UserId, delta: i64) -> Result<(), StorageError> {
        self.inner.record_progress(user_id, delta).await
    }

    async fn get_progress(&self, user_id: &UserId) -> Result<i64, StorageError> {
        self.inner.get_progress(user_id).await
    }
}

#[tokio::test(start_paused = true)]
async fn transient_save_failures_are_retried() {
    let quiz = build_quiz("quiz-1");
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(&quiz).await.unwrap();
    let flaky = Arc::new(FlakyAttempts {
        inner: repo.clone(),
        failures: AtomicU32::new(2),
    });
    let service = QuizFlowService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        flaky,
        Arc::new(repo.clone()),
        Arc::new(InMemorySnapshotStore::new()),
    );

    let mut session = service
        .start_session(quiz.id(), &UserId::new("u1"), "Dana")
        .await
        .unwrap()
        .session;
    session
        .answer(&QuestionId::new("q1"), "Paris", fixed_now())
        .unwrap();

    // Two failures fit inside the three-try budget.
    let outcome = service.submit(&mut session).await.unwrap();
    assert_eq!(outcome.report.total, 1);
    assert_eq!(session.phase(), SessionPhase::Completed);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_keep_answers_and_allow_resubmit() {
    let quiz = build_quiz("quiz-1");
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(&quiz).await.unwrap();
    let flaky = Arc::new(FlakyAttempts {
        inner: repo.clone(),
        failures: AtomicU32::new(4),
    });
    let snapshots = Arc::new(InMemorySnapshotStore::new());
    let service = QuizFlowService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        flaky,
        Arc::new(repo.clone()),
        snapshots.clone(),
    );
    let user = UserId::new("u1");

    let mut session = service
        .start_session(quiz.id(), &user, "Dana")
        .await
        .unwrap()
        .session;
    session
        .answer(&QuestionId::new("q1"), "Paris", fixed_now())
        .unwrap();

    let key = SnapshotKey::new(quiz.id().clone(), user.clone());
    snapshots
        .save(&key, &session.snapshot(fixed_now()))
        .await
        .unwrap();

    // Four failures exceed the budget: submission fails, snapshot survives.
    let err = service.submit(&mut session).await.unwrap_err();
    assert!(matches!(err, SessionError::SubmissionFailed { tries: 3, .. }));
    assert_eq!(session.phase(), SessionPhase::Failed);
    assert!(snapshots.load(&key).await.unwrap().is_some());
    assert!(repo.get_attempt(quiz.id(), &user).await.unwrap().is_none());

    // The retained answers make a retry possible; the fifth insert succeeds.
    let outcome = service.submit(&mut session).await.unwrap();
    settle().await;
    assert_eq!(outcome.report.total, 1);
    assert_eq!(session.phase(), SessionPhase::Completed);
    assert!(snapshots.load(&key).await.unwrap().is_none());
}

/// Leaderboard wrapper that lets a rival submit right before each of the
/// first `races` writes, forcing version conflicts.
struct RacingLeaderboard {
    inner: InMemoryRepository,
    races: AtomicU32,
    rival_seq: AtomicU32,
}

impl RacingLeaderboard {
    async fn rival_submits(&self) {
        let n = self.rival_seq.fetch_add(1, Ordering::SeqCst);
        let rival = LeaderboardEntry::new(
            UserId::new(format!("rival-{n}")),
            format!("Rival {n}"),
            50 + n,
            100,
            fixed_now(),
        );
        let quiz_id = QuizId::new("quiz-1");
        match self.inner.get_leaderboard(&quiz_id).await.unwrap() {
            Some(mut current) => {
                current.document.merge(rival, fixed_now());
                self.inner
                    .put_leaderboard(&current.document, Some(current.version))
                    .await
                    .unwrap();
            }
            None => {
                let doc = LeaderboardDocument::initial(quiz_id, rival, fixed_now());
                self.inner.put_leaderboard(&doc, None).await.unwrap();
            }
        }
    }
}

#[async_trait]
impl LeaderboardRepository for RacingLeaderboard {
    async fn get_leaderboard(
        &self,
        quiz_id: &QuizId,
    ) -> Result<Option<storage::repository::VersionedLeaderboard>, StorageError> {
        self.inner.get_leaderboard(quiz_id).await
    }

    async fn put_leaderboard(
        &self,
        document: &LeaderboardDocument,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        if self.races.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| {
            (r > 0).then(|| r - 1)
        }).is_ok()
        {
            self.rival_submits().await;
        }
        self.inner.put_leaderboard(document, expected_version).await
    }
}

#[tokio::test]
async fn lost_merge_race_refetches_and_keeps_both_entries() {
    let quiz = build_quiz("quiz-1");
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(&quiz).await.unwrap();
    let racing = Arc::new(RacingLeaderboard {
        inner: repo.clone(),
        races: AtomicU32::new(1),
        rival_seq: AtomicU32::new(0),
    });
    let service = QuizFlowService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        racing,
        Arc::new(InMemorySnapshotStore::new()),
    );
    let user = UserId::new("u1");

    let mut session = service
        .start_session(quiz.id(), &user, "Dana")
        .await
        .unwrap()
        .session;
    session
        .answer(&QuestionId::new("q1"), "Paris", fixed_now())
        .unwrap();
    session
        .answer(&QuestionId::new("q2"), "Jupiter", fixed_now())
        .unwrap();

    let outcome = service.submit(&mut session).await.unwrap();
    settle().await;

    // Neither submitter's entry was lost.
    let board = repo.get_leaderboard(quiz.id()).await.unwrap().unwrap();
    assert_eq!(board.document.entries().len(), 2);
    assert!(board.document.position_of(&user).is_some());
    assert!(board.document.position_of(&UserId::new("rival-0")).is_some());
    assert_eq!(outcome.leaderboard_position, board.document.position_of(&user));
}

#[tokio::test]
async fn endless_races_surface_conflict_after_attempt_is_saved() {
    let quiz = build_quiz("quiz-1");
    let repo = InMemoryRepository::new();
    repo.upsert_quiz(&quiz).await.unwrap();
    let racing = Arc::new(RacingLeaderboard {
        inner: repo.clone(),
        races: AtomicU32::new(u32::MAX),
        rival_seq: AtomicU32::new(0),
    });
    let service = QuizFlowService::new(
        fixed_clock(),
        Arc::new(repo.clone()),
        Arc::new(repo.clone()),
        racing,
        Arc::new(InMemorySnapshotStore::new()),
    );
    let user = UserId::new("u1");

    let mut session = service
        .start_session(quiz.id(), &user, "Dana")
        .await
        .unwrap()
        .session;
    session
        .answer(&QuestionId::new("q1"), "Paris", fixed_now())
        .unwrap();

    let err = service.submit(&mut session).await.unwrap_err();
    settle().await;

    assert!(matches!(err, SessionError::LeaderboardConflict { rounds: 3, .. }));
    // The attempt itself is durable and the session is complete.
    assert!(repo.get_attempt(quiz.id(), &user).await.unwrap().is_some());
    assert_eq!(session.phase(), SessionPhase::Completed);
    assert_eq!(session.outcome().unwrap().leaderboard_position, None);

    // A repeated submit reports the cached outcome, not a new attempt.
    let outcome = service.submit(&mut session).await.unwrap();
    assert_eq!(outcome.leaderboard_position, None);
}
