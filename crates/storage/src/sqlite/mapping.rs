use course_core::model::{
    AttemptId, CommentId, EvaluationDefinition, EvaluationId, EvaluationKind, GradeOutcome,
    StepComment, StepId, UserAttempt, UserId,
};
use sqlx::Row;

use crate::repository::StorageError;

fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

pub(crate) fn id_to_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

/// Translate driver errors, surfacing constraint violations as domain errors.
///
/// Unique violations mean the row already exists; foreign key violations mean
/// the referenced parent does not.
pub(crate) fn db_err(e: sqlx::Error) -> StorageError {
    match e.as_database_error() {
        Some(db) if db.is_unique_violation() => StorageError::Conflict,
        Some(db) if db.is_foreign_key_violation() => StorageError::NotFound,
        _ => StorageError::Connection(e.to_string()),
    }
}

/// Storage encoding of the tri-state grade: NULL pending, 1 passed, 0 failed.
pub(crate) fn outcome_to_i64(outcome: GradeOutcome) -> Option<i64> {
    outcome.pass_flag().map(i64::from)
}

pub(crate) fn outcome_from_i64(value: Option<i64>) -> Result<GradeOutcome, StorageError> {
    let flag = match value {
        None => None,
        Some(0) => Some(false),
        Some(1) => Some(true),
        Some(other) => {
            return Err(StorageError::Serialization(format!(
                "invalid pass flag: {other}"
            )));
        }
    };
    Ok(GradeOutcome::from_pass_flag(flag))
}

pub(crate) fn map_definition_row(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<EvaluationDefinition, StorageError> {
    let id = i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?;
    let step_id = i64_to_u64("step_id", row.try_get::<i64, _>("step_id").map_err(ser)?)?;
    let gems_i64: i64 = row.try_get("gems").map_err(ser)?;
    let gems = u32::try_from(gems_i64)
        .map_err(|_| StorageError::Serialization(format!("invalid gems: {gems_i64}")))?;

    Ok(EvaluationDefinition {
        id: EvaluationId::new(id),
        step_id: StepId::new(step_id),
        order: row.try_get("sort_order").map_err(ser)?,
        instruction: row.try_get("instruction").map_err(ser)?,
        kind: EvaluationKind::from_tag(row.try_get::<String, _>("kind").map_err(ser)?),
        question: row.try_get("question").map_err(ser)?,
        gems,
    })
}

pub(crate) fn map_attempt_row(row: &sqlx::sqlite::SqliteRow) -> Result<UserAttempt, StorageError> {
    let id = i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?;
    let user_id = i64_to_u64("user_id", row.try_get::<i64, _>("user_id").map_err(ser)?)?;
    let evaluation_id = i64_to_u64(
        "step_evaluation_id",
        row.try_get::<i64, _>("step_evaluation_id").map_err(ser)?,
    )?;

    Ok(UserAttempt {
        id: AttemptId::new(id),
        user_id: UserId::new(user_id),
        evaluation_id: EvaluationId::new(evaluation_id),
        content: row.try_get("content").map_err(ser)?,
        outcome: outcome_from_i64(row.try_get::<Option<i64>, _>("pass").map_err(ser)?)?,
        comment: row.try_get("comment").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        updated_at: row.try_get("updated_at").map_err(ser)?,
    })
}

pub(crate) fn map_comment_row(row: &sqlx::sqlite::SqliteRow) -> Result<StepComment, StorageError> {
    let id = i64_to_u64("id", row.try_get::<i64, _>("id").map_err(ser)?)?;
    let step_id = i64_to_u64("step_id", row.try_get::<i64, _>("step_id").map_err(ser)?)?;
    let user_id = i64_to_u64("user_id", row.try_get::<i64, _>("user_id").map_err(ser)?)?;

    Ok(StepComment {
        id: CommentId::new(id),
        step_id: StepId::new(step_id),
        user_id: UserId::new(user_id),
        content: row.try_get("content").map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
    })
}

pub(crate) fn u64_from_column(
    row: &sqlx::sqlite::SqliteRow,
    column: &'static str,
) -> Result<u64, StorageError> {
    i64_to_u64(column, row.try_get::<i64, _>(column).map_err(ser)?)
}
