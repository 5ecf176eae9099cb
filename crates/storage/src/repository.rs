use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    AttemptId, CommentId, CommentUpvote, EvaluationDefinition, EvaluationId, GradeOutcome,
    NewAttempt, NewComment, StepComment, StepId, StepLocation, UserAttempt, UserId,
};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Read access to authored evaluation definitions, plus the authoring write
/// path used by seeding and tests.
#[async_trait]
pub trait EvaluationRepository: Send + Sync {
    /// All definitions attached to a step, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures. An unknown step yields
    /// an empty list, not an error.
    async fn definitions_for_step(
        &self,
        step_id: StepId,
    ) -> Result<Vec<EvaluationDefinition>, StorageError>;

    /// Persist or update a definition.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the step does not exist.
    async fn upsert_definition(&self, definition: &EvaluationDefinition)
    -> Result<(), StorageError>;
}

/// Per-user attempts against evaluation definitions.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    /// The user's attempt for one evaluation, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn attempt_for(
        &self,
        evaluation_id: EvaluationId,
        user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError>;

    /// Every attempt graded as passed for one evaluation, ordered by identifier.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn passing_attempts(
        &self,
        evaluation_id: EvaluationId,
    ) -> Result<Vec<UserAttempt>, StorageError>;

    /// Insert a new ungraded attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the user already has an attempt for
    /// the evaluation, `StorageError::NotFound` if the evaluation is unknown.
    async fn create_attempt(
        &self,
        attempt: NewAttempt,
        now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError>;

    /// Fetch an attempt by ID, only if it belongs to `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn attempt_by_id_for_user(
        &self,
        id: AttemptId,
        user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError>;

    /// Store a reviewer's decision on an attempt.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the attempt does not exist.
    async fn record_grade(
        &self,
        id: AttemptId,
        outcome: GradeOutcome,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError>;
}

/// Step placement within modules and courses.
#[async_trait]
pub trait StepRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn step_location(&self, step_id: StepId) -> Result<Option<StepLocation>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` if the step cannot be stored.
    async fn upsert_step(&self, location: &StepLocation) -> Result<(), StorageError>;
}

/// Step discussion threads and their upvotes.
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Comments on a step, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn comments_for_step(&self, step_id: StepId) -> Result<Vec<StepComment>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the step does not exist.
    async fn create_comment(
        &self,
        comment: NewComment,
        now: DateTime<Utc>,
    ) -> Result<StepComment, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn upvotes_for_comment(
        &self,
        comment_id: CommentId,
    ) -> Result<Vec<CommentUpvote>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn find_upvote(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<Option<CommentUpvote>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the upvote already exists and
    /// `StorageError::NotFound` if the comment does not.
    async fn create_upvote(&self, upvote: CommentUpvote) -> Result<(), StorageError>;

    /// Removing an absent upvote is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on repository failures.
    async fn delete_upvote(&self, upvote: CommentUpvote) -> Result<(), StorageError>;
}

#[derive(Default)]
struct MemoryState {
    steps: BTreeMap<StepId, StepLocation>,
    definitions: BTreeMap<EvaluationId, EvaluationDefinition>,
    attempts: BTreeMap<AttemptId, UserAttempt>,
    comments: BTreeMap<CommentId, StepComment>,
    upvotes: BTreeSet<(CommentId, UserId)>,
    next_attempt_id: u64,
    next_comment_id: u64,
}

/// Simple in-memory repository implementation for testing and prototyping.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

#[async_trait]
impl EvaluationRepository for InMemoryRepository {
    async fn definitions_for_step(
        &self,
        step_id: StepId,
    ) -> Result<Vec<EvaluationDefinition>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .definitions
            .values()
            .filter(|d| d.step_id == step_id)
            .cloned()
            .collect())
    }

    async fn upsert_definition(
        &self,
        definition: &EvaluationDefinition,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.steps.contains_key(&definition.step_id) {
            return Err(StorageError::NotFound);
        }
        guard.definitions.insert(definition.id, definition.clone());
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryRepository {
    async fn attempt_for(
        &self,
        evaluation_id: EvaluationId,
        user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .attempts
            .values()
            .find(|a| a.evaluation_id == evaluation_id && a.user_id == user_id)
            .cloned())
    }

    async fn passing_attempts(
        &self,
        evaluation_id: EvaluationId,
    ) -> Result<Vec<UserAttempt>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .attempts
            .values()
            .filter(|a| a.evaluation_id == evaluation_id && a.outcome.is_passed())
            .cloned()
            .collect())
    }

    async fn create_attempt(
        &self,
        attempt: NewAttempt,
        now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError> {
        let mut guard = self.lock()?;
        if !guard.definitions.contains_key(&attempt.evaluation_id) {
            return Err(StorageError::NotFound);
        }
        let duplicate = guard
            .attempts
            .values()
            .any(|a| a.evaluation_id == attempt.evaluation_id && a.user_id == attempt.user_id);
        if duplicate {
            return Err(StorageError::Conflict);
        }

        guard.next_attempt_id += 1;
        let stored = attempt.into_attempt(AttemptId::new(guard.next_attempt_id), now);
        guard.attempts.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn attempt_by_id_for_user(
        &self,
        id: AttemptId,
        user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .attempts
            .get(&id)
            .filter(|a| a.user_id == user_id)
            .cloned())
    }

    async fn record_grade(
        &self,
        id: AttemptId,
        outcome: GradeOutcome,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError> {
        let mut guard = self.lock()?;
        let attempt = guard.attempts.get_mut(&id).ok_or(StorageError::NotFound)?;
        attempt.outcome = outcome;
        attempt.comment = comment;
        attempt.updated_at = now;
        Ok(attempt.clone())
    }
}

#[async_trait]
impl StepRepository for InMemoryRepository {
    async fn step_location(&self, step_id: StepId) -> Result<Option<StepLocation>, StorageError> {
        let guard = self.lock()?;
        Ok(guard.steps.get(&step_id).copied())
    }

    async fn upsert_step(&self, location: &StepLocation) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.steps.insert(location.step_id, *location);
        Ok(())
    }
}

#[async_trait]
impl CommentRepository for InMemoryRepository {
    async fn comments_for_step(&self, step_id: StepId) -> Result<Vec<StepComment>, StorageError> {
        let guard = self.lock()?;
        let mut comments: Vec<StepComment> = guard
            .comments
            .values()
            .filter(|c| c.step_id == step_id)
            .cloned()
            .collect();
        comments.sort_by_key(|c| (c.created_at, c.id));
        Ok(comments)
    }

    async fn create_comment(
        &self,
        comment: NewComment,
        now: DateTime<Utc>,
    ) -> Result<StepComment, StorageError> {
        let mut guard = self.lock()?;
        if !guard.steps.contains_key(&comment.step_id) {
            return Err(StorageError::NotFound);
        }
        guard.next_comment_id += 1;
        let stored = StepComment {
            id: CommentId::new(guard.next_comment_id),
            step_id: comment.step_id,
            user_id: comment.user_id,
            content: comment.content,
            created_at: now,
        };
        guard.comments.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn upvotes_for_comment(
        &self,
        comment_id: CommentId,
    ) -> Result<Vec<CommentUpvote>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .upvotes
            .range((comment_id, UserId::new(0))..=(comment_id, UserId::new(u64::MAX)))
            .map(|&(comment_id, user_id)| CommentUpvote {
                comment_id,
                user_id,
            })
            .collect())
    }

    async fn find_upvote(
        &self,
        comment_id: CommentId,
        user_id: UserId,
    ) -> Result<Option<CommentUpvote>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .upvotes
            .contains(&(comment_id, user_id))
            .then_some(CommentUpvote {
                comment_id,
                user_id,
            }))
    }

    async fn create_upvote(&self, upvote: CommentUpvote) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        if !guard.comments.contains_key(&upvote.comment_id) {
            return Err(StorageError::NotFound);
        }
        if !guard.upvotes.insert((upvote.comment_id, upvote.user_id)) {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    async fn delete_upvote(&self, upvote: CommentUpvote) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        guard.upvotes.remove(&(upvote.comment_id, upvote.user_id));
        Ok(())
    }
}

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub evaluations: Arc<dyn EvaluationRepository>,
    pub attempts: Arc<dyn AttemptRepository>,
    pub steps: Arc<dyn StepRepository>,
    pub comments: Arc<dyn CommentRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        let repo = InMemoryRepository::new();
        Self {
            evaluations: Arc::new(repo.clone()),
            attempts: Arc::new(repo.clone()),
            steps: Arc::new(repo.clone()),
            comments: Arc::new(repo),
        }
    }
}
