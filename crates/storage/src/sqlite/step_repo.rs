use course_core::model::{CourseId, ModuleId, StepId, StepLocation};

use super::{
    SqliteRepository,
    mapping::{db_err, id_to_i64, u64_from_column},
};
use crate::repository::{StepRepository, StorageError};

#[async_trait::async_trait]
impl StepRepository for SqliteRepository {
    async fn step_location(&self, step_id: StepId) -> Result<Option<StepLocation>, StorageError> {
        let row = sqlx::query(
            r"
            SELECT s.id AS step_id, s.module_id AS module_id, m.course_id AS course_id
            FROM steps s
            JOIN modules m ON m.id = s.module_id
            WHERE s.id = ?1
            ",
        )
        .bind(id_to_i64("step_id", step_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(|row| -> Result<StepLocation, StorageError> {
            Ok(StepLocation::new(
                StepId::new(u64_from_column(&row, "step_id")?),
                ModuleId::new(u64_from_column(&row, "module_id")?),
                CourseId::new(u64_from_column(&row, "course_id")?),
            ))
        })
        .transpose()
    }

    async fn upsert_step(&self, location: &StepLocation) -> Result<(), StorageError> {
        let step_id = id_to_i64("step_id", location.step_id.value())?;
        let module_id = id_to_i64("module_id", location.module_id.value())?;
        let course_id = id_to_i64("course_id", location.course_id.value())?;

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        sqlx::query(
            r"
            INSERT INTO modules (id, course_id)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET course_id = excluded.course_id
            ",
        )
        .bind(module_id)
        .bind(course_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        sqlx::query(
            r"
            INSERT INTO steps (id, module_id)
            VALUES (?1, ?2)
            ON CONFLICT(id) DO UPDATE SET module_id = excluded.module_id
            ",
        )
        .bind(step_id)
        .bind(module_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(())
    }
}
