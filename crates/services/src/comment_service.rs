use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use course_core::model::{CommentId, CommentUpvote, NewComment, StepComment, StepId, UserId};
use storage::repository::CommentRepository;

use crate::Clock;
use crate::error::CommentServiceError;

/// A comment as shown to one viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepCommentView {
    pub id: CommentId,
    pub step_id: StepId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub upvotes: usize,
    pub has_upvoted: bool,
}

/// Result of toggling an upvote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpvoteState {
    Added,
    Removed,
}

/// Step discussion threads.
#[derive(Clone)]
pub struct CommentService {
    clock: Clock,
    comments: Arc<dyn CommentRepository>,
}

impl CommentService {
    #[must_use]
    pub fn new(clock: Clock, comments: Arc<dyn CommentRepository>) -> Self {
        Self { clock, comments }
    }

    /// Comments on a step, oldest first, with upvote totals for `viewer`.
    ///
    /// # Errors
    ///
    /// Returns `CommentServiceError::Storage` if repository access fails.
    #[instrument(skip_all, fields(step_id = %step_id, viewer = %viewer))]
    pub async fn step_comments(
        &self,
        step_id: StepId,
        viewer: UserId,
    ) -> Result<Vec<StepCommentView>, CommentServiceError> {
        let comments = self.comments.comments_for_step(step_id).await?;
        let mut views = Vec::with_capacity(comments.len());
        for comment in comments {
            let upvotes = self.comments.upvotes_for_comment(comment.id).await?;
            let has_upvoted = upvotes.iter().any(|u| u.user_id == viewer);
            views.push(StepCommentView {
                id: comment.id,
                step_id: comment.step_id,
                user_id: comment.user_id,
                content: comment.content,
                created_at: comment.created_at,
                upvotes: upvotes.len(),
                has_upvoted,
            });
        }
        Ok(views)
    }

    /// Post a comment on a step.
    ///
    /// # Errors
    ///
    /// Returns `CommentServiceError::Comment` for blank content.
    /// Returns `CommentServiceError::Storage` if the step is unknown or the
    /// write fails.
    #[instrument(skip_all, fields(step_id = %step_id, user_id = %user_id))]
    pub async fn post_comment(
        &self,
        step_id: StepId,
        user_id: UserId,
        content: String,
    ) -> Result<StepComment, CommentServiceError> {
        let comment = NewComment::new(step_id, user_id, content)?;
        let stored = self.comments.create_comment(comment, self.clock.now()).await?;
        debug!(comment_id = %stored.id, "comment posted");
        Ok(stored)
    }

    /// Add the user's upvote, or remove it if already present.
    ///
    /// # Errors
    ///
    /// Returns `CommentServiceError::Storage` if the comment is unknown or the
    /// write fails.
    #[instrument(skip_all, fields(comment_id = %comment_id, user_id = %user_id))]
    pub async fn toggle_upvote(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<UpvoteState, CommentServiceError> {
        if let Some(existing) = self.comments.find_upvote(comment_id, user_id).await? {
            self.comments.delete_upvote(existing).await?;
            return Ok(UpvoteState::Removed);
        }
        self.comments
            .create_upvote(CommentUpvote {
                comment_id,
                user_id,
            })
            .await?;
        Ok(UpvoteState::Added)
    }
}
