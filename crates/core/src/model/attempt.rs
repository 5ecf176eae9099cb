use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{AttemptId, EvaluationId, UserId};

//
// ─── GRADE OUTCOME ─────────────────────────────────────────────────────────────
//

/// Grading state of an attempt.
///
/// `Pending` means no reviewer has looked at the attempt yet; it is never
/// treated as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeOutcome {
    #[default]
    Pending,
    Passed,
    Failed,
}

impl GradeOutcome {
    /// Maps the persisted nullable pass flag onto an outcome.
    #[must_use]
    pub fn from_pass_flag(flag: Option<bool>) -> Self {
        match flag {
            None => Self::Pending,
            Some(true) => Self::Passed,
            Some(false) => Self::Failed,
        }
    }

    #[must_use]
    pub fn pass_flag(self) -> Option<bool> {
        match self {
            GradeOutcome::Pending => None,
            GradeOutcome::Passed => Some(true),
            GradeOutcome::Failed => Some(false),
        }
    }

    #[must_use]
    pub fn is_passed(self) -> bool {
        matches!(self, GradeOutcome::Passed)
    }

    #[must_use]
    pub fn is_graded(self) -> bool {
        !matches!(self, GradeOutcome::Pending)
    }
}

//
// ─── ATTEMPT ───────────────────────────────────────────────────────────────────
//

/// A user's submission against one evaluation definition.
///
/// For image evaluations `content` holds the object-storage key of the upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAttempt {
    pub id: AttemptId,
    pub user_id: UserId,
    pub evaluation_id: EvaluationId,
    pub content: String,
    pub outcome: GradeOutcome,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserAttempt {
    /// True once a reviewer has both decided the outcome and left a comment.
    #[must_use]
    pub fn is_reviewed(&self) -> bool {
        self.outcome.is_graded() && self.comment.is_some()
    }
}

/// Unpersisted submission. Storage assigns the identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttempt {
    pub user_id: UserId,
    pub evaluation_id: EvaluationId,
    pub content: String,
}

impl NewAttempt {
    #[must_use]
    pub fn new(user_id: UserId, evaluation_id: EvaluationId, content: impl Into<String>) -> Self {
        Self {
            user_id,
            evaluation_id,
            content: content.into(),
        }
    }

    /// Materialize the submission as an ungraded attempt.
    #[must_use]
    pub fn into_attempt(self, id: AttemptId, now: DateTime<Utc>) -> UserAttempt {
        UserAttempt {
            id,
            user_id: self.user_id,
            evaluation_id: self.evaluation_id,
            content: self.content,
            outcome: GradeOutcome::Pending,
            comment: None,
            created_at: now,
            updated_at: now,
        }
    }
}
