use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use course_core::{
    model::{
        AttemptId, EvaluationDefinition, EvaluationId, GradeOutcome, NewAttempt, StepId,
        UserAttempt, UserId,
    },
    object_url::ObjectUrlResolver,
    progress::{self, EvaluationReportEntry, GemTally},
    time::Clock,
};
use storage::repository::{
    AttemptRepository, EvaluationRepository, StepRepository, Storage, StorageError,
};

use crate::error::{ProgressError, SubmissionError};

/// Aggregates a step's evaluation definitions and user attempts into
/// progress views.
///
/// Every read runs in two phases: fetch everything the view needs, then hand
/// the collections to the pure folds in `course_core::progress`. The first
/// repository error aborts the call.
#[derive(Clone)]
pub struct ProgressService {
    clock: Clock,
    evaluations: Arc<dyn EvaluationRepository>,
    attempts: Arc<dyn AttemptRepository>,
    steps: Arc<dyn StepRepository>,
    resolver: Arc<dyn ObjectUrlResolver>,
}

impl ProgressService {
    #[must_use]
    pub fn new(
        clock: Clock,
        evaluations: Arc<dyn EvaluationRepository>,
        attempts: Arc<dyn AttemptRepository>,
        steps: Arc<dyn StepRepository>,
        resolver: Arc<dyn ObjectUrlResolver>,
    ) -> Self {
        Self {
            clock,
            evaluations,
            attempts,
            steps,
            resolver,
        }
    }

    #[must_use]
    pub fn from_storage(clock: Clock, storage: &Storage, resolver: Arc<dyn ObjectUrlResolver>) -> Self {
        Self::new(
            clock,
            Arc::clone(&storage.evaluations),
            Arc::clone(&storage.attempts),
            Arc::clone(&storage.steps),
            resolver,
        )
    }

    /// Total vs. earned gems for `user_id` on `step_id`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Fetch` if any repository read fails.
    #[instrument(skip_all, fields(step_id = %step_id, user_id = %user_id))]
    pub async fn gem_tally(
        &self,
        step_id: StepId,
        user_id: UserId,
    ) -> Result<GemTally, ProgressError> {
        let definitions = self.evaluations.definitions_for_step(step_id).await?;
        let attempts = self.user_attempts(&definitions, user_id).await?;

        let tally = progress::tally_gems(&definitions, &attempts);
        debug!(total = tally.total, current = tally.current, "gem tally computed");
        Ok(tally)
    }

    /// Users who passed every evaluation of `step_id`.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Fetch` if any repository read fails.
    #[instrument(skip_all, fields(step_id = %step_id))]
    pub async fn completion_set(&self, step_id: StepId) -> Result<BTreeSet<UserId>, ProgressError> {
        let definitions = self.evaluations.definitions_for_step(step_id).await?;

        let mut passing: HashMap<EvaluationId, Vec<UserAttempt>> =
            HashMap::with_capacity(definitions.len());
        for definition in &definitions {
            let attempts = self.attempts.passing_attempts(definition.id).await?;
            passing.insert(definition.id, attempts);
        }

        let completed = progress::completion_set(&definitions, &passing);
        debug!(
            evaluations = definitions.len(),
            completed = completed.len(),
            "completion set computed"
        );
        Ok(completed)
    }

    /// Every evaluation of `step_id` in display order, merged with the
    /// user's attempt.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Fetch` if any repository read fails and
    /// `ProgressError::UrlResolution` if an image submission cannot be turned
    /// into a URL.
    #[instrument(skip_all, fields(step_id = %step_id, user_id = %user_id))]
    pub async fn evaluation_report(
        &self,
        step_id: StepId,
        user_id: UserId,
    ) -> Result<Vec<EvaluationReportEntry>, ProgressError> {
        let definitions = self.evaluations.definitions_for_step(step_id).await?;
        let attempts = self.user_attempts(&definitions, user_id).await?;

        let report = progress::evaluation_report(&definitions, &attempts, self.resolver.as_ref())?;
        debug!(entries = report.len(), "evaluation report built");
        Ok(report)
    }

    /// Persist a new, ungraded attempt and return its identifier.
    ///
    /// Content is stored as given; format checks happen before this call.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::Persistence` if storage rejects the write,
    /// including a second attempt for the same user and evaluation.
    #[instrument(skip_all, fields(user_id = %attempt.user_id, evaluation_id = %attempt.evaluation_id))]
    pub async fn submit_attempt(&self, attempt: NewAttempt) -> Result<AttemptId, SubmissionError> {
        match self.attempts.create_attempt(attempt, self.clock.now()).await {
            Ok(stored) => {
                debug!(attempt_id = %stored.id, "attempt stored");
                Ok(stored.id)
            }
            Err(e) => {
                warn!(error = %e, "attempt rejected by storage");
                Err(e.into())
            }
        }
    }

    /// Record a reviewer's decision on an existing attempt.
    ///
    /// # Errors
    ///
    /// Returns `SubmissionError::Persistence` if the attempt is unknown or the
    /// update fails.
    #[instrument(skip_all, fields(attempt_id = %attempt_id, outcome = ?outcome))]
    pub async fn record_grade(
        &self,
        attempt_id: AttemptId,
        outcome: GradeOutcome,
        comment: Option<String>,
    ) -> Result<UserAttempt, SubmissionError> {
        let graded = self
            .attempts
            .record_grade(attempt_id, outcome, comment, self.clock.now())
            .await?;
        Ok(graded)
    }

    /// The subset of `attempt_ids` that a reviewer has fully handled (outcome
    /// decided and a comment left), in the order requested.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Fetch(StorageError::NotFound)` if an ID does not
    /// name an attempt owned by `user_id`.
    #[instrument(skip_all, fields(user_id = %user_id, requested = attempt_ids.len()))]
    pub async fn graded_attempts(
        &self,
        user_id: UserId,
        attempt_ids: &[AttemptId],
    ) -> Result<Vec<UserAttempt>, ProgressError> {
        let mut reviewed = Vec::with_capacity(attempt_ids.len());
        for id in attempt_ids {
            let attempt = self
                .attempts
                .attempt_by_id_for_user(*id, user_id)
                .await?
                .ok_or(StorageError::NotFound)?;
            if attempt.is_reviewed() {
                reviewed.push(attempt);
            }
        }
        Ok(reviewed)
    }

    /// Object key an image submission for `evaluation_id` should be uploaded
    /// under.
    ///
    /// # Errors
    ///
    /// Returns `ProgressError::Fetch` if the step cannot be located.
    pub async fn upload_object_key(
        &self,
        step_id: StepId,
        evaluation_id: EvaluationId,
        user_id: UserId,
    ) -> Result<String, ProgressError> {
        let location = self
            .steps
            .step_location(step_id)
            .await?
            .ok_or(StorageError::NotFound)?;
        Ok(location.upload_object_key(evaluation_id, user_id, self.clock.now()))
    }

    async fn user_attempts(
        &self,
        definitions: &[EvaluationDefinition],
        user_id: UserId,
    ) -> Result<HashMap<EvaluationId, UserAttempt>, StorageError> {
        let mut attempts = HashMap::with_capacity(definitions.len());
        for definition in definitions {
            if let Some(attempt) = self.attempts.attempt_for(definition.id, user_id).await? {
                attempts.insert(definition.id, attempt);
            }
        }
        Ok(attempts)
    }
}
