use quiz_core::model::{Quiz, QuizId};

use super::mapping::{map_quiz_row, quiz_kind_str, ser};
use super::SqliteRepository;
use crate::repository::{QuizRepository, StorageError};

#[async_trait::async_trait]
impl QuizRepository for SqliteRepository {
    async fn upsert_quiz(&self, quiz: &Quiz) -> Result<(), StorageError> {
        let questions = serde_json::to_string(quiz.questions()).map_err(ser)?;

        sqlx::query(
            r"
            INSERT INTO quizzes (id, title, duration_minutes, questions, end_time, kind)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                duration_minutes = excluded.duration_minutes,
                questions = excluded.questions,
                end_time = excluded.end_time,
                kind = excluded.kind
            ",
        )
        .bind(quiz.id().as_str())
        .bind(quiz.title())
        .bind(i64::from(quiz.duration_minutes()))
        .bind(questions)
        .bind(quiz.end_time())
        .bind(quiz_kind_str(quiz.kind()))
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        Ok(())
    }

    async fn get_quiz(&self, id: &QuizId) -> Result<Quiz, StorageError> {
        let row = sqlx::query(
            r"
            SELECT id, title, duration_minutes, questions, end_time, kind
            FROM quizzes
            WHERE id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?
        .ok_or(StorageError::NotFound)?;

        map_quiz_row(&row)
    }
}
