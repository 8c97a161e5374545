use std::collections::BTreeMap;

use chrono::Duration;
use quiz_core::model::{
    Answer, Attempt, Choice, LeaderboardDocument, LeaderboardEntry, Question, QuestionId, Quiz,
    QuizId, QuizKind, UserId,
};
use quiz_core::time::fixed_now;
use storage::repository::{AttemptRepository, LeaderboardRepository, QuizRepository, StorageError};
use storage::sqlite::SqliteRepository;

fn build_quiz(id: &str) -> Quiz {
    let questions = vec![
        Question::multiple_choice(
            QuestionId::new("q1"),
            "Capital of France?",
            1,
            vec![Choice::new("Paris", true), Choice::new("Lyon", false)],
        )
        .unwrap(),
        Question::numeric(QuestionId::new("q2"), "Six times seven?", 2, 42.0, 0.01).unwrap(),
    ];
    Quiz::new(
        QuizId::new(id),
        "Geography",
        10,
        questions,
        fixed_now() + Duration::hours(1),
        QuizKind::Internal,
    )
    .unwrap()
}

fn build_attempt(quiz: &str, user: &str, score: u32) -> Attempt {
    let mut answers = BTreeMap::new();
    answers.insert(QuestionId::new("q1"), Answer::new("Paris", fixed_now()));
    answers.insert(QuestionId::new("q2"), Answer::new("42", fixed_now()));
    Attempt::new(
        QuizId::new(quiz),
        UserId::new(user),
        user.to_uppercase(),
        answers,
        200,
        score,
        fixed_now(),
    )
}

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

#[tokio::test]
async fn quiz_round_trips_with_questions() {
    let repo = connect("memdb_quiz_roundtrip").await;
    let quiz = build_quiz("quiz-1");

    repo.upsert_quiz(&quiz).await.unwrap();
    let fetched = repo.get_quiz(quiz.id()).await.unwrap();

    assert_eq!(fetched, quiz);
    assert_eq!(fetched.total_points(), 3);
    assert!(matches!(
        repo.get_quiz(&QuizId::new("missing")).await,
        Err(StorageError::NotFound)
    ));
}

#[tokio::test]
async fn attempt_unique_per_quiz_and_user() {
    let repo = connect("memdb_attempt_unique").await;
    let quiz = build_quiz("quiz-1");
    repo.upsert_quiz(&quiz).await.unwrap();

    let attempt = build_attempt("quiz-1", "u1", 3);
    repo.insert_attempt(&attempt).await.unwrap();

    let fetched = repo
        .get_attempt(quiz.id(), &UserId::new("u1"))
        .await
        .unwrap()
        .expect("attempt stored");
    assert_eq!(fetched, attempt);

    assert!(matches!(
        repo.insert_attempt(&attempt).await,
        Err(StorageError::AlreadyExists)
    ));

    // Other users are unaffected.
    repo.insert_attempt(&build_attempt("quiz-1", "u2", 1))
        .await
        .unwrap();
}

#[tokio::test]
async fn leaderboard_cas_update_and_conflict() {
    let repo = connect("memdb_leaderboard_cas").await;
    let quiz = build_quiz("quiz-1");
    repo.upsert_quiz(&quiz).await.unwrap();

    assert!(repo.get_leaderboard(quiz.id()).await.unwrap().is_none());

    let entry = LeaderboardEntry::new(UserId::new("u1"), "U1", 3, 200, fixed_now());
    let doc = LeaderboardDocument::initial(quiz.id().clone(), entry, fixed_now());
    let v1 = repo.put_leaderboard(&doc, None).await.unwrap();
    assert_eq!(v1, 1);

    let mut current = repo
        .get_leaderboard(quiz.id())
        .await
        .unwrap()
        .expect("document created");
    assert_eq!(current.version, 1);
    assert_eq!(current.document.entries().len(), 1);

    let second = LeaderboardEntry::new(UserId::new("u2"), "U2", 5, 100, fixed_now());
    current.document.merge(second, fixed_now());
    let v2 = repo
        .put_leaderboard(&current.document, Some(current.version))
        .await
        .unwrap();
    assert_eq!(v2, 2);

    // Writing with the stale version must not clobber the newer document.
    assert!(matches!(
        repo.put_leaderboard(&current.document, Some(v1)).await,
        Err(StorageError::Conflict)
    ));
    assert!(matches!(
        repo.put_leaderboard(&current.document, None).await,
        Err(StorageError::Conflict)
    ));

    let reread = repo.get_leaderboard(quiz.id()).await.unwrap().unwrap();
    assert_eq!(reread.version, 2);
    assert_eq!(reread.document.entries()[0].user_id(), &UserId::new("u2"));
}

#[tokio::test]
async fn progress_counter_round_trips() {
    let repo = connect("memdb_progress").await;
    let user = UserId::new("u1");

    assert_eq!(repo.get_progress(&user).await.unwrap(), 0);
    repo.record_progress(&user, 1).await.unwrap();
    repo.record_progress(&user, 1).await.unwrap();
    assert_eq!(repo.get_progress(&user).await.unwrap(), 2);
}
