use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use course_core::model::{
    AttemptId, CourseId, EvaluationDefinition, EvaluationId, EvaluationKind, GradeOutcome,
    ModuleId, NewAttempt, StepId, StepLocation, UserAttempt, UserId,
};
use course_core::object_url::{ObjectStore, ObjectUrlError, ObjectUrlResolver};
use course_core::progress::GemTally;
use course_core::time::fixed_now;
use services::{Clock, ProgressError, ProgressService, SubmissionError};
use storage::repository::{
    AttemptRepository, EvaluationRepository, InMemoryRepository, StepRepository, Storage,
    StorageError,
};

const STEP: StepId = StepId::new(3);

async fn seed(evaluations: &dyn EvaluationRepository, steps: &dyn StepRepository) {
    steps
        .upsert_step(&StepLocation::new(STEP, ModuleId::new(2), CourseId::new(1)))
        .await
        .unwrap();
    for (id, order, kind, gems) in [(1, 2, "text", 5), (2, 1, "image", 3)] {
        let def = EvaluationDefinition::new(
            EvaluationId::new(id),
            STEP,
            order,
            EvaluationKind::from_tag(kind),
            gems,
        );
        evaluations.upsert_definition(&def).await.unwrap();
    }
}

fn store() -> Arc<dyn ObjectUrlResolver> {
    Arc::new(ObjectStore::new("https://store.example", "bucket1").unwrap())
}

#[tokio::test]
async fn sqlite_backed_progress_flow() {
    let storage = Storage::sqlite("sqlite:file:memdb_progress_flow?mode=memory&cache=shared")
        .await
        .unwrap();
    seed(storage.evaluations.as_ref(), storage.steps.as_ref()).await;
    let service = ProgressService::from_storage(Clock::fixed(fixed_now()), &storage, store());

    let learner = UserId::new(7);
    let key = service
        .upload_object_key(STEP, EvaluationId::new(2), learner)
        .await
        .unwrap();
    let image = service
        .submit_attempt(NewAttempt::new(learner, EvaluationId::new(2), key.clone()))
        .await
        .unwrap();
    service
        .record_grade(image, GradeOutcome::Passed, Some("looks right".into()))
        .await
        .unwrap();

    let tally = service.gem_tally(STEP, learner).await.unwrap();
    assert_eq!(tally, GemTally { total: 8, current: 3 });
    assert!(service.completion_set(STEP).await.unwrap().is_empty());

    let report = service.evaluation_report(STEP, learner).await.unwrap();
    assert_eq!(report[0].evaluation_id, EvaluationId::new(2));
    let resolved = report[0].attempt.as_ref().unwrap();
    assert_eq!(
        resolved.content,
        format!("https://store.example/bucket1/{key}")
    );
    assert!(report[1].attempt.is_none());

    let text = service
        .submit_attempt(NewAttempt::new(learner, EvaluationId::new(1), "answer"))
        .await
        .unwrap();
    service
        .record_grade(text, GradeOutcome::Passed, Some("good".into()))
        .await
        .unwrap();
    assert_eq!(
        service.completion_set(STEP).await.unwrap(),
        BTreeSet::from([learner])
    );

    let graded = service
        .graded_attempts(learner, &[text, image])
        .await
        .unwrap();
    let ids: Vec<AttemptId> = graded.iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![text, image]);

    let err = service
        .submit_attempt(NewAttempt::new(learner, EvaluationId::new(1), "again"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SubmissionError::Persistence(StorageError::Conflict)
    ));
}

/// Attempt store whose reads always fail.
struct BrokenAttempts;

#[async_trait]
impl AttemptRepository for BrokenAttempts {
    async fn attempt_for(
        &self,
        _evaluation_id: EvaluationId,
        _user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError> {
        Err(StorageError::Connection("connection reset".into()))
    }

    async fn passing_attempts(
        &self,
        _evaluation_id: EvaluationId,
    ) -> Result<Vec<UserAttempt>, StorageError> {
        Err(StorageError::Connection("connection reset".into()))
    }

    async fn create_attempt(
        &self,
        _attempt: NewAttempt,
        _now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError> {
        Err(StorageError::Connection("connection reset".into()))
    }

    async fn attempt_by_id_for_user(
        &self,
        _id: AttemptId,
        _user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError> {
        Err(StorageError::Connection("connection reset".into()))
    }

    async fn record_grade(
        &self,
        _id: AttemptId,
        _outcome: GradeOutcome,
        _comment: Option<String>,
        _now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError> {
        Err(StorageError::Connection("connection reset".into()))
    }
}

/// Attempt store that answers for evaluation 1 and fails from evaluation 2 on.
struct FailsAfterFirst {
    inner: InMemoryRepository,
}

impl FailsAfterFirst {
    fn check(evaluation_id: EvaluationId) -> Result<(), StorageError> {
        if evaluation_id == EvaluationId::new(1) {
            Ok(())
        } else {
            Err(StorageError::Connection("connection dropped".into()))
        }
    }
}

#[async_trait]
impl AttemptRepository for FailsAfterFirst {
    async fn attempt_for(
        &self,
        evaluation_id: EvaluationId,
        user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError> {
        Self::check(evaluation_id)?;
        self.inner.attempt_for(evaluation_id, user_id).await
    }

    async fn passing_attempts(
        &self,
        evaluation_id: EvaluationId,
    ) -> Result<Vec<UserAttempt>, StorageError> {
        Self::check(evaluation_id)?;
        self.inner.passing_attempts(evaluation_id).await
    }

    async fn create_attempt(
        &self,
        attempt: NewAttempt,
        now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError> {
        self.inner.create_attempt(attempt, now).await
    }

    async fn attempt_by_id_for_user(
        &self,
        id: AttemptId,
        user_id: UserId,
    ) -> Result<Option<UserAttempt>, StorageError> {
        self.inner.attempt_by_id_for_user(id, user_id).await
    }

    async fn record_grade(
        &self,
        id: AttemptId,
        outcome: GradeOutcome,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<UserAttempt, StorageError> {
        self.inner.record_grade(id, outcome, comment, now).await
    }
}

/// Definition store whose reads always fail.
struct BrokenDefinitions;

#[async_trait]
impl EvaluationRepository for BrokenDefinitions {
    async fn definitions_for_step(
        &self,
        _step_id: StepId,
    ) -> Result<Vec<EvaluationDefinition>, StorageError> {
        Err(StorageError::Connection("connection reset".into()))
    }

    async fn upsert_definition(
        &self,
        _definition: &EvaluationDefinition,
    ) -> Result<(), StorageError> {
        Err(StorageError::Connection("connection reset".into()))
    }
}

#[tokio::test]
async fn failure_after_first_evaluation_discards_partial_results() {
    let repo = InMemoryRepository::new();
    seed(&repo, &repo).await;
    let learner = UserId::new(1);
    let first = repo
        .create_attempt(NewAttempt::new(learner, EvaluationId::new(1), "answer"), fixed_now())
        .await
        .unwrap();
    repo.record_grade(first.id, GradeOutcome::Passed, Some("ok".into()), fixed_now())
        .await
        .unwrap();

    let attempts = Arc::new(FailsAfterFirst {
        inner: repo.clone(),
    });
    // The first definition's attempt is readable.
    assert!(
        attempts
            .attempt_for(EvaluationId::new(1), learner)
            .await
            .unwrap()
            .is_some()
    );

    let repo = Arc::new(repo);
    let service = ProgressService::new(
        Clock::fixed(fixed_now()),
        repo.clone(),
        attempts,
        repo,
        store(),
    );

    assert!(matches!(
        service.gem_tally(STEP, learner).await,
        Err(ProgressError::Fetch(StorageError::Connection(_)))
    ));
    assert!(matches!(
        service.completion_set(STEP).await,
        Err(ProgressError::Fetch(StorageError::Connection(_)))
    ));
    assert!(matches!(
        service.evaluation_report(STEP, learner).await,
        Err(ProgressError::Fetch(StorageError::Connection(_)))
    ));
}

#[tokio::test]
async fn failing_definitions_fetch_yields_only_an_error() {
    let repo = Arc::new(InMemoryRepository::new());
    let service = ProgressService::new(
        Clock::fixed(fixed_now()),
        Arc::new(BrokenDefinitions),
        repo.clone(),
        repo,
        store(),
    );

    let learner = UserId::new(1);
    assert!(matches!(
        service.gem_tally(STEP, learner).await,
        Err(ProgressError::Fetch(_))
    ));
    assert!(matches!(
        service.completion_set(STEP).await,
        Err(ProgressError::Fetch(_))
    ));
    assert!(matches!(
        service.evaluation_report(STEP, learner).await,
        Err(ProgressError::Fetch(_))
    ));
}

/// Resolver that refuses every key.
struct RefusingResolver;

impl ObjectUrlResolver for RefusingResolver {
    fn resolve(&self, _key: &str) -> Result<String, ObjectUrlError> {
        Err(ObjectUrlError::EmptyBucket)
    }
}

#[tokio::test]
async fn failing_fetch_yields_only_an_error() {
    let repo = InMemoryRepository::new();
    seed(&repo, &repo).await;
    let repo = Arc::new(repo);
    let service = ProgressService::new(
        Clock::fixed(fixed_now()),
        repo.clone(),
        Arc::new(BrokenAttempts),
        repo,
        store(),
    );

    let learner = UserId::new(1);
    assert!(matches!(
        service.gem_tally(STEP, learner).await,
        Err(ProgressError::Fetch(StorageError::Connection(_)))
    ));
    assert!(matches!(
        service.completion_set(STEP).await,
        Err(ProgressError::Fetch(_))
    ));
    assert!(matches!(
        service.evaluation_report(STEP, learner).await,
        Err(ProgressError::Fetch(_))
    ));
    assert!(matches!(
        service
            .submit_attempt(NewAttempt::new(learner, EvaluationId::new(1), "x"))
            .await,
        Err(SubmissionError::Persistence(_))
    ));
}

#[tokio::test]
async fn unresolvable_image_aborts_the_report() {
    let repo = InMemoryRepository::new();
    seed(&repo, &repo).await;
    let learner = UserId::new(1);
    repo.create_attempt(
        NewAttempt::new(learner, EvaluationId::new(2), "shot.png"),
        fixed_now(),
    )
    .await
    .unwrap();

    let repo = Arc::new(repo);
    let service = ProgressService::new(
        Clock::fixed(fixed_now()),
        repo.clone(),
        repo.clone(),
        repo,
        Arc::new(RefusingResolver),
    );

    let err = service.evaluation_report(STEP, learner).await.unwrap_err();
    assert!(matches!(err, ProgressError::UrlResolution(_)));

    // Text-only reads are unaffected by the resolver.
    let tally = service.gem_tally(STEP, learner).await.unwrap();
    assert_eq!(tally.total, 8);
}
