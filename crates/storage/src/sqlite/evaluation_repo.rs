use course_core::model::{EvaluationDefinition, StepId};

use super::{
    SqliteRepository,
    mapping::{db_err, id_to_i64, map_definition_row},
};
use crate::repository::{EvaluationRepository, StorageError};

#[async_trait::async_trait]
impl EvaluationRepository for SqliteRepository {
    async fn definitions_for_step(
        &self,
        step_id: StepId,
    ) -> Result<Vec<EvaluationDefinition>, StorageError> {
        let step = id_to_i64("step_id", step_id.value())?;

        let rows = sqlx::query(
            r"
            SELECT id, step_id, sort_order, instruction, kind, question, gems
            FROM step_evaluations
            WHERE step_id = ?1
            ORDER BY id ASC
            ",
        )
        .bind(step)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_definition_row(&row)?);
        }
        Ok(out)
    }

    async fn upsert_definition(
        &self,
        definition: &EvaluationDefinition,
    ) -> Result<(), StorageError> {
        sqlx::query(
            r"
            INSERT INTO step_evaluations (
                id, step_id, sort_order, instruction, kind, question, gems
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                step_id = excluded.step_id,
                sort_order = excluded.sort_order,
                instruction = excluded.instruction,
                kind = excluded.kind,
                question = excluded.question,
                gems = excluded.gems
            ",
        )
        .bind(id_to_i64("evaluation_id", definition.id.value())?)
        .bind(id_to_i64("step_id", definition.step_id.value())?)
        .bind(definition.order)
        .bind(definition.instruction.as_str())
        .bind(definition.kind.as_str())
        .bind(definition.question.as_str())
        .bind(i64::from(definition.gems))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }
}
