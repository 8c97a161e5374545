use quiz_core::model::{LeaderboardDocument, QuizId};

use super::mapping::{map_leaderboard_row, ser, version_to_i64};
use super::SqliteRepository;
use crate::repository::{LeaderboardRepository, StorageError, VersionedLeaderboard};

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

#[async_trait::async_trait]
impl LeaderboardRepository for SqliteRepository {
    async fn get_leaderboard(
        &self,
        quiz_id: &QuizId,
    ) -> Result<Option<VersionedLeaderboard>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT quiz_id, entries, version, last_updated
            FROM leaderboards
            WHERE quiz_id = ?1
            ",
        )
        .bind(quiz_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

        row.as_ref()
            .map(map_leaderboard_row)
            .transpose()
            .map(|opt| {
                opt.map(|(document, version)| VersionedLeaderboard { document, version })
            })
    }

    async fn put_leaderboard(
        &self,
        document: &LeaderboardDocument,
        expected_version: Option<u64>,
    ) -> Result<u64, StorageError> {
        let entries = serde_json::to_string(document.entries()).map_err(ser)?;

        match expected_version {
            // First writer creates the row; the primary key turns a racing
            // create into a conflict the caller can re-fetch on.
            None => {
                let result = sqlx::query(
                    r"
                    INSERT INTO leaderboards (quiz_id, entries, version, last_updated)
                    VALUES (?1, ?2, 1, ?3)
                    ",
                )
                .bind(document.quiz_id().as_str())
                .bind(entries)
                .bind(document.last_updated())
                .execute(&self.pool)
                .await;

                match result {
                    Ok(_) => Ok(1),
                    Err(e) if is_unique_violation(&e) => Err(StorageError::Conflict),
                    Err(e) => Err(StorageError::Connection(e.to_string())),
                }
            }
            Some(expected) => {
                let expected = version_to_i64(expected)?;
                let result = sqlx::query(
                    r"
                    UPDATE leaderboards
                    SET entries = ?1, version = version + 1, last_updated = ?2
                    WHERE quiz_id = ?3 AND version = ?4
                    ",
                )
                .bind(entries)
                .bind(document.last_updated())
                .bind(document.quiz_id().as_str())
                .bind(expected)
                .execute(&self.pool)
                .await
                .map_err(|e| StorageError::Connection(e.to_string()))?;

                if result.rows_affected() == 0 {
                    return Err(StorageError::Conflict);
                }
                u64::try_from(expected + 1).map_err(ser)
            }
        }
    }
}
