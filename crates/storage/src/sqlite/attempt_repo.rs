use chrono::{DateTime, Utc};
use course_core::model::{AttemptId, EvaluationId, GradeOutcome, NewAttempt, UserAttempt, UserId};

use super::{
    SqliteRepository,
    mapping::{db_err, id_to_i64, map_attempt_row, outcome_to_i64},
};
use crate::repository::{AttemptRepository, StorageError};

const ATTEMPT_COLUMNS: &str = r"
    id, user_id, step_evaluation_id, content, pass, comment, created_at, updated_at
";

impl SqliteRepository {
    async fn fetch_attempt(&self, id: i64) -> Result<UserAttempt, StorageError> {
        let sql = format!("SELECT {ATTEMPT_COLUMNS} FROM user_evaluations WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?
            .ok_or(StorageError::NotFound)?;
        map_attempt_row(&row)
    }
}

#[async_trait::async_trait]
impl AttemptRepository for SqliteRepository {
    async fn attempt_for(
        &self,
        evaluation_id: EvaluationId,
        user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM user_evaluations \
             WHERE step_evaluation_id = ?1 AND user_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("evaluation_id", evaluation_id.value())?)
            .bind(id_to_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn passing_attempts(
        &self,
        evaluation_id: EvaluationId,
    ) -> Result<Vec<UserAttempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM user_evaluations \
             WHERE step_evaluation_id = ?1 AND pass = 1 \
             ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_to_i64("evaluation_id", evaluation_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_attempt_row(&row)?);
        }
        Ok(out)
    }

    async fn create_attempt(
        &self,
        attempt: NewAttempt,
        now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO user_evaluations (
                    user_id, step_evaluation_id, content, pass, comment, created_at, updated_at
                )
                VALUES (?1, ?2, ?3, NULL, NULL, ?4, ?4)
            ",
        )
        .bind(id_to_i64("user_id", attempt.user_id.value())?)
        .bind(id_to_i64("evaluation_id", attempt.evaluation_id.value())?)
        .bind(attempt.content.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("attempt id sign overflow".into()))?;
        Ok(attempt.into_attempt(AttemptId::new(id), now))
    }

    async fn attempt_by_id_for_user(
        &self,
        id: AttemptId,
        user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError> {
        let sql = format!(
            "SELECT {ATTEMPT_COLUMNS} FROM user_evaluations WHERE id = ?1 AND user_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_to_i64("attempt_id", id.value())?)
            .bind(id_to_i64("user_id", user_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        row.as_ref().map(map_attempt_row).transpose()
    }

    async fn record_grade(
        &self,
        id: AttemptId,
        outcome: GradeOutcome,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError> {
        let attempt_id = id_to_i64("attempt_id", id.value())?;

        let res = sqlx::query(
            r"
                UPDATE user_evaluations
                SET pass = ?2, comment = ?3, updated_at = ?4
                WHERE id = ?1
            ",
        )
        .bind(attempt_id)
        .bind(outcome_to_i64(outcome))
        .bind(comment)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        self.fetch_attempt(attempt_id).await
    }
}
