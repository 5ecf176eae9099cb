//! Step progress aggregation.
//!
//! Every function here is a pure fold over data that has already been
//! fetched: the step's evaluation definitions plus the attempts that belong to
//! them, keyed by evaluation. Callers own the I/O.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::model::{
    EvaluationDefinition, EvaluationId, EvaluationKind, GradeOutcome, StepId, UserAttempt, UserId,
};
use crate::object_url::{ObjectUrlError, ObjectUrlResolver};

//
// ─── GEM TALLY ─────────────────────────────────────────────────────────────────
//

/// Possible vs. earned gems for one user on one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct GemTally {
    pub total: u64,
    pub current: u64,
}

/// Sum every definition's gems into `total`, and the gems of definitions the
/// user has passed into `current`.
///
/// A definition without an attempt still counts towards `total`.
#[must_use]
pub fn tally_gems(
    definitions: &[EvaluationDefinition],
    attempts: &HashMap<EvaluationId, UserAttempt>,
) -> GemTally {
    definitions
        .iter()
        .fold(GemTally::default(), |mut tally, definition| {
            let gems = u64::from(definition.gems);
            tally.total += gems;
            if attempts
                .get(&definition.id)
                .is_some_and(|attempt| attempt.outcome.is_passed())
            {
                tally.current += gems;
            }
            tally
        })
}

//
// ─── COMPLETION SET ────────────────────────────────────────────────────────────
//

/// Users holding a passing attempt for every definition of the step.
///
/// A step without definitions has no completion evidence, so nobody is
/// complete. Attempts are counted as given; duplicates are not collapsed.
#[must_use]
pub fn completion_set(
    definitions: &[EvaluationDefinition],
    passing: &HashMap<EvaluationId, Vec<UserAttempt>>,
) -> BTreeSet<UserId> {
    if definitions.is_empty() {
        return BTreeSet::new();
    }

    let mut pass_counts: HashMap<UserId, usize> = HashMap::new();
    for definition in definitions {
        let Some(attempts) = passing.get(&definition.id) else {
            continue;
        };
        for attempt in attempts.iter().filter(|a| a.outcome.is_passed()) {
            *pass_counts.entry(attempt.user_id).or_default() += 1;
        }
    }

    let required = definitions.len();
    pass_counts
        .into_iter()
        .filter_map(|(user_id, count)| (count == required).then_some(user_id))
        .collect()
}

//
// ─── EVALUATION REPORT ─────────────────────────────────────────────────────────
//

/// A user's attempt as it should be displayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAttempt {
    pub content: String,
    pub outcome: GradeOutcome,
    pub comment: Option<String>,
}

/// One row of the per-user evaluation report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationReportEntry {
    pub step_id: StepId,
    pub evaluation_id: EvaluationId,
    pub order: i32,
    pub instruction: String,
    pub kind: EvaluationKind,
    pub question: String,
    pub attempt: Option<ResolvedAttempt>,
}

/// Merge definitions with the user's attempts and sort by `order`.
///
/// Image attempts have their stored key rewritten through `resolver`; all
/// other content is passed through. The sort is stable, so definitions
/// sharing an `order` keep the sequence in which they were given.
///
/// # Errors
///
/// Returns the first `ObjectUrlError` raised by `resolver`; no partial report
/// is produced.
pub fn evaluation_report(
    definitions: &[EvaluationDefinition],
    attempts: &HashMap<EvaluationId, UserAttempt>,
    resolver: &dyn ObjectUrlResolver,
) -> Result<Vec<EvaluationReportEntry>, ObjectUrlError> {
    let mut entries = definitions
        .iter()
        .map(|definition| -> Result<EvaluationReportEntry, ObjectUrlError> {
            let attempt = attempts
                .get(&definition.id)
                .map(|attempt| resolve_attempt(definition, attempt, resolver))
                .transpose()?;
            Ok(EvaluationReportEntry {
                step_id: definition.step_id,
                evaluation_id: definition.id,
                order: definition.order,
                instruction: definition.instruction.clone(),
                kind: definition.kind.clone(),
                question: definition.question.clone(),
                attempt,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    entries.sort_by_key(|entry| entry.order);
    Ok(entries)
}

fn resolve_attempt(
    definition: &EvaluationDefinition,
    attempt: &UserAttempt,
    resolver: &dyn ObjectUrlResolver,
) -> Result<ResolvedAttempt, ObjectUrlError> {
    let content = if definition.kind.is_image() {
        resolver.resolve(&attempt.content)?
    } else {
        attempt.content.clone()
    };
    Ok(ResolvedAttempt {
        content,
        outcome: attempt.outcome,
        comment: attempt.comment.clone(),
    })
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AttemptId;
    use crate::object_url::ObjectStore;
    use crate::time::fixed_now;

    fn definition(id: u64, order: i32, kind: &str, gems: u32) -> EvaluationDefinition {
        EvaluationDefinition::new(
            EvaluationId::new(id),
            StepId::new(1),
            order,
            EvaluationKind::from_tag(kind),
            gems,
        )
        .with_question(format!("question {id}"))
    }

    fn attempt(id: u64, user: u64, evaluation: u64, outcome: GradeOutcome) -> UserAttempt {
        UserAttempt {
            id: AttemptId::new(id),
            user_id: UserId::new(user),
            evaluation_id: EvaluationId::new(evaluation),
            content: format!("content {id}"),
            outcome,
            comment: None,
            created_at: fixed_now(),
            updated_at: fixed_now(),
        }
    }

    fn by_evaluation(attempts: Vec<UserAttempt>) -> HashMap<EvaluationId, UserAttempt> {
        attempts.into_iter().map(|a| (a.evaluation_id, a)).collect()
    }

    fn store() -> ObjectStore {
        ObjectStore::new("https://store.example", "bucket1").unwrap()
    }

    struct BrokenResolver;

    impl ObjectUrlResolver for BrokenResolver {
        fn resolve(&self, key: &str) -> Result<String, ObjectUrlError> {
            Err(ObjectUrlError::InvalidEscape {
                segment: key.to_owned(),
            })
        }
    }

    #[test]
    fn tally_without_attempts_counts_only_total() {
        let defs = vec![definition(1, 1, "text", 4), definition(2, 2, "text", 6)];
        let tally = tally_gems(&defs, &HashMap::new());
        assert_eq!(tally, GemTally { total: 10, current: 0 });
    }

    #[test]
    fn tally_of_empty_step_is_zero() {
        assert_eq!(tally_gems(&[], &HashMap::new()), GemTally::default());
    }

    #[test]
    fn tally_ignores_pending_and_failed_attempts() {
        let defs = vec![
            definition(1, 1, "text", 1),
            definition(2, 2, "text", 2),
            definition(3, 3, "text", 4),
        ];
        let attempts = by_evaluation(vec![
            attempt(1, 7, 1, GradeOutcome::Passed),
            attempt(2, 7, 2, GradeOutcome::Failed),
            attempt(3, 7, 3, GradeOutcome::Pending),
        ]);
        assert_eq!(tally_gems(&defs, &attempts), GemTally { total: 7, current: 1 });
    }

    #[test]
    fn mixed_order_scenario() {
        let defs = vec![definition(1, 2, "text", 5), definition(2, 1, "text", 3)];
        let attempts = by_evaluation(vec![attempt(1, 7, 2, GradeOutcome::Passed)]);

        assert_eq!(tally_gems(&defs, &attempts), GemTally { total: 8, current: 3 });

        let report = evaluation_report(&defs, &attempts, &store()).unwrap();
        let orders: Vec<i32> = report.iter().map(|e| e.order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(report[0].evaluation_id, EvaluationId::new(2));
    }

    #[test]
    fn completion_requires_every_definition() {
        let defs = vec![definition(1, 1, "text", 1), definition(2, 2, "text", 1)];
        let passing = HashMap::from([
            (
                EvaluationId::new(1),
                vec![
                    attempt(1, 10, 1, GradeOutcome::Passed),
                    attempt(2, 11, 1, GradeOutcome::Passed),
                ],
            ),
            (
                EvaluationId::new(2),
                vec![attempt(3, 10, 2, GradeOutcome::Passed)],
            ),
        ]);

        let done = completion_set(&defs, &passing);
        assert_eq!(done, BTreeSet::from([UserId::new(10)]));
    }

    #[test]
    fn completion_of_empty_step_is_empty() {
        let passing = HashMap::from([(
            EvaluationId::new(1),
            vec![attempt(1, 10, 1, GradeOutcome::Passed)],
        )]);
        assert!(completion_set(&[], &passing).is_empty());
    }

    #[test]
    fn completion_skips_non_passing_records() {
        let defs = vec![definition(1, 1, "text", 1)];
        let passing = HashMap::from([(
            EvaluationId::new(1),
            vec![
                attempt(1, 10, 1, GradeOutcome::Passed),
                attempt(2, 11, 1, GradeOutcome::Pending),
            ],
        )]);
        assert_eq!(
            completion_set(&defs, &passing),
            BTreeSet::from([UserId::new(10)])
        );
    }

    #[test]
    fn report_keeps_definition_without_attempt() {
        let defs = vec![definition(1, 1, "text", 1)];
        let report = evaluation_report(&defs, &HashMap::new(), &store()).unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].question, "question 1");
        assert!(report[0].attempt.is_none());
    }

    #[test]
    fn report_resolves_image_content_only() {
        let defs = vec![definition(1, 1, "image", 1), definition(2, 2, "text", 1)];
        let mut image = attempt(1, 7, 1, GradeOutcome::Passed);
        image.content = "abc.png".into();
        image.comment = Some("looks right".into());
        let mut text = attempt(2, 7, 2, GradeOutcome::Pending);
        text.content = "abc.png".into();

        let report = evaluation_report(&defs, &by_evaluation(vec![image, text]), &store()).unwrap();

        let first = report[0].attempt.as_ref().unwrap();
        assert_eq!(first.content, "https://store.example/bucket1/abc.png");
        assert_eq!(first.outcome, GradeOutcome::Passed);
        assert_eq!(first.comment.as_deref(), Some("looks right"));

        let second = report[1].attempt.as_ref().unwrap();
        assert_eq!(second.content, "abc.png");
        assert_eq!(second.outcome, GradeOutcome::Pending);
    }

    #[test]
    fn report_sort_is_stable_for_equal_orders() {
        let defs = vec![
            definition(5, 2, "text", 1),
            definition(3, 1, "text", 1),
            definition(9, 2, "text", 1),
            definition(1, 2, "text", 1),
        ];
        let report = evaluation_report(&defs, &HashMap::new(), &store()).unwrap();
        let ids: Vec<u64> = report.iter().map(|e| e.evaluation_id.value()).collect();
        assert_eq!(ids, vec![3, 5, 9, 1]);
    }

    #[test]
    fn report_aborts_on_resolution_failure() {
        let defs = vec![definition(1, 1, "text", 1), definition(2, 2, "image", 1)];
        let attempts = by_evaluation(vec![
            attempt(1, 7, 1, GradeOutcome::Passed),
            attempt(2, 7, 2, GradeOutcome::Passed),
        ]);
        let err = evaluation_report(&defs, &attempts, &BrokenResolver).unwrap_err();
        assert!(matches!(err, ObjectUrlError::InvalidEscape { .. }));
    }

    #[test]
    fn image_without_attempt_does_not_touch_resolver() {
        let defs = vec![definition(1, 1, "image", 1)];
        let report = evaluation_report(&defs, &HashMap::new(), &BrokenResolver).unwrap();
        assert!(report[0].attempt.is_none());
    }
}
