use quiz_core::model::{Attempt, AttemptId, QuizId, UserId};
use sqlx::Row;

use super::mapping::{map_attempt_row, ser};
use super::SqliteRepository;
use crate::repository::{AttemptRepository, StorageError};

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn get_attempt(
        &self,
        quiz_id: &QuizId,
        user_id: &UserId,
    ) -> Result<Option<Attempt>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT quiz_id, user_id, user_name, answers, time_spent_secs, score, submitted_at
            FROM attempts
            WHERE quiz_id = ?1 AND user_id = ?2
            ",
        )
        .bind(quiz_id.as_str())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn insert_attempt(&self, attempt: &Attempt) -> Result<AttemptId, StorageError> {
        let id = AttemptId::generate();
        let answers = serde_json::to_string(attempt.answers()).map_err(ser)?;

        let result = sqlx::query(
            r"
            INSERT INTO attempts (
                id, quiz_id, user_id, user_name, answers,
                time_spent_secs, score, submitted_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ",
        )
        .bind(id.as_str())
        .bind(attempt.quiz_id().as_str())
        .bind(attempt.user_id().as_str())
        .bind(attempt.user_name())
        .bind(answers)
        .bind(i64::from(attempt.time_spent_secs()))
        .bind(i64::from(attempt.score()))
        .bind(attempt.submitted_at())
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => Err(StorageError::AlreadyExists),
            Err(e) => Err(StorageError::Connection(e.to_string())),
        }
    }

    async fn record_progress(&self, user_id: &UserId, delta: i64) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO user_progress (user_id, completed)
            VALUES (?1, ?2)
            ON CONFLICT(user_id) DO UPDATE SET
                completed = completed + excluded.completed
            ",
        )
        .bind(user_id.as_str())
        .bind(delta)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_progress(&self, user_id: &UserId) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT completed FROM user_progress WHERE user_id = ?1")
            .bind(user_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.map(|r| r.try_get::<i64, _>("completed").map_err(ser))
            .transpose()
            .map(|v| v.unwrap_or(0))
    }
}
