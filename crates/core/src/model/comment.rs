use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::ids::{CommentId, StepId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommentError {
    #[error("comment cannot be empty")]
    Empty,
}

/// Discussion entry posted by a user under a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepComment {
    pub id: CommentId,
    pub step_id: StepId,
    pub user_id: UserId,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Validated, not yet persisted comment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewComment {
    pub step_id: StepId,
    pub user_id: UserId,
    pub content: String,
}

impl NewComment {
    /// # Errors
    ///
    /// Returns `CommentError::Empty` when the content is blank.
    pub fn new(
        step_id: StepId,
        user_id: UserId,
        content: impl Into<String>,
    ) -> Result<Self, CommentError> {
        let content = content.into();
        if content.trim().is_empty() {
            return Err(CommentError::Empty);
        }
        Ok(Self {
            step_id,
            user_id,
            content,
        })
    }
}

/// A single user's upvote on a comment. At most one per (comment, user).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CommentUpvote {
    pub comment_id: CommentId,
    pub user_id: UserId,
}
