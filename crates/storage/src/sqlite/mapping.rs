use quiz_core::model::{
    Answer, Attempt, LeaderboardDocument, LeaderboardEntry, Question, QuestionId, Quiz, QuizId,
    QuizKind, UserId,
};
use sqlx::Row;
use std::collections::BTreeMap;

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn quiz_kind_str(kind: QuizKind) -> &'static str {
    match kind {
        QuizKind::Internal => "internal",
        QuizKind::External => "external",
    }
}

pub(crate) fn parse_quiz_kind(s: &str) -> Result<QuizKind, StorageError> {
    match s {
        "internal" => Ok(QuizKind::Internal),
        "external" => Ok(QuizKind::External),
        _ => Err(StorageError::Serialization(format!("invalid quiz kind: {s}"))),
    }
}

pub(crate) fn map_quiz_row(row: &sqlx::sqlite::SqliteRow) -> Result<Quiz, StorageError> {
    let questions: Vec<Question> =
        serde_json::from_str(&row.try_get::<String, _>("questions").map_err(ser)?).map_err(ser)?;

    // Quiz::new re-checks the construction invariants, so a hand-edited row
    // cannot smuggle an invalid quiz back into the domain.
    Quiz::new(
        QuizId::new(row.try_get::<String, _>("id").map_err(ser)?),
        row.try_get::<String, _>("title").map_err(ser)?,
        u32::try_from(row.try_get::<i64, _>("duration_minutes").map_err(ser)?).map_err(ser)?,
        questions,
        row.try_get("end_time").map_err(ser)?,
        parse_quiz_kind(&row.try_get::<String, _>("kind").map_err(ser)?)?,
    )
    .map_err(ser)
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<Attempt, StorageError> {
    let answers: BTreeMap<QuestionId, Answer> =
        serde_json::from_str(&row.try_get::<String, _>("answers").map_err(ser)?).map_err(ser)?;

    Ok(Attempt::new(
        QuizId::new(row.try_get::<String, _>("quiz_id").map_err(ser)?),
        UserId::new(row.try_get::<String, _>("user_id").map_err(ser)?),
        row.try_get::<String, _>("user_name").map_err(ser)?,
        answers,
        u32::try_from(row.try_get::<i64, _>("time_spent_secs").map_err(ser)?).map_err(ser)?,
        u32::try_from(row.try_get::<i64, _>("score").map_err(ser)?).map_err(ser)?,
        row.try_get("submitted_at").map_err(ser)?,
    ))
}

pub(crate) fn map_leaderboard_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<(LeaderboardDocument, u64), StorageError> {
    let entries: Vec<LeaderboardEntry> =
        serde_json::from_str(&row.try_get::<String, _>("entries").map_err(ser)?).map_err(ser)?;
    let version = u64::try_from(row.try_get::<i64, _>("version").map_err(ser)?).map_err(ser)?;

    let document = LeaderboardDocument::from_persisted(
        QuizId::new(row.try_get::<String, _>("quiz_id").map_err(ser)?),
        entries,
        row.try_get("last_updated").map_err(ser)?,
    );
    Ok((document, version))
}

pub(crate) fn version_to_i64(version: u64) -> Result<i64, StorageError> {
    i64::try_from(version).map_err(|_| StorageError::Serialization("version overflow".into()))
}
