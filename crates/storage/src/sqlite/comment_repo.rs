use chrono::{DateTime, Utc};
use course_core::model::{CommentId, CommentUpvote, NewComment, StepComment, StepId, UserId};

use super::{
    SqliteRepository,
    mapping::{db_err, id_to_i64, map_comment_row, u64_from_column},
};
use crate::repository::{CommentRepository, StorageError};

#[async_trait::async_trait]
impl CommentRepository for SqliteRepository {
    async fn comments_for_step(&self, step_id: StepId) -> Result<Vec<StepComment>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT id, step_id, user_id, content, created_at
            FROM step_comments
            WHERE step_id = ?1
            ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(id_to_i64("step_id", step_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_comment_row(&row)?);
        }
        Ok(out)
    }

    async fn create_comment(
        &self,
        comment: NewComment,
        now: DateTime<Utc>,
    ) -> Result<StepComment, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO step_comments (step_id, user_id, content, created_at)
                VALUES (?1, ?2, ?3, ?4)
            ",
        )
        .bind(id_to_i64("step_id", comment.step_id.value())?)
        .bind(id_to_i64("user_id", comment.user_id.value())?)
        .bind(comment.content.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("comment id sign overflow".into()))?;
        Ok(StepComment {
            id: CommentId::new(id),
            step_id: comment.step_id,
            user_id: comment.user_id,
            content: comment.content,
            created_at: now,
        })
    }

    async fn upvotes_for_comment(
        &self,
        comment_id: CommentId,
    ) -> Result<Vec<CommentUpvote>, StorageError> {
        let rows = sqlx::query(
            r"
            SELECT comment_id, user_id
            FROM step_comment_upvotes
            WHERE comment_id = ?1
            ORDER BY user_id ASC
            ",
        )
        .bind(id_to_i64("comment_id", comment_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(CommentUpvote {
                comment_id: CommentId::new(u64_from_column(&row, "comment_id")?),
                user_id: UserId::new(u64_from_column(&row, "user_id")?),
            });
        }
        Ok(out)
    }

    async fn find_upvote(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<Option<CommentUpvote>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT 1 FROM step_comment_upvotes
            WHERE comment_id = ?1 AND user_id = ?2
            ",
        )
        .bind(id_to_i64("comment_id", comment_id.value())?)
        .bind(id_to_i64("user_id", user_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(row.map(|_| CommentUpvote {
            comment_id,
            user_id,
        }))
    }

    async fn create_upvote(&self, upvote: CommentUpvote) -> Result<(), StorageError> {
        sqlx::query(
            r"
                INSERT INTO step_comment_upvotes (comment_id, user_id)
                VALUES (?1, ?2)
            ",
        )
        .bind(id_to_i64("comment_id", upvote.comment_id.value())?)
        .bind(id_to_i64("user_id", upvote.user_id.value())?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn delete_upvote(&self, upvote: CommentUpvote) -> Result<(), StorageError> {
        sqlx::query(
            r"
                DELETE FROM step_comment_upvotes
                WHERE comment_id = ?1 AND user_id = ?2
            ",
        )
        .bind(id_to_i64("comment_id", upvote.comment_id.value())?)
        .bind(id_to_i64("user_id", upvote.user_id.value())?)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }
}
