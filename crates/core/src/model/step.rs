use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{CourseId, EvaluationId, ModuleId, StepId, UserId};

/// Where a step sits in the course hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLocation {
    pub step_id: StepId,
    pub module_id: ModuleId,
    pub course_id: CourseId,
}

impl StepLocation {
    #[must_use]
    pub fn new(step_id: StepId, module_id: ModuleId, course_id: CourseId) -> Self {
        Self {
            step_id,
            module_id,
            course_id,
        }
    }

    /// Object key under which a user's image submission for `evaluation_id`
    /// is uploaded.
    ///
    /// Keys embed the full hierarchy and the upload time so repeated uploads
    /// never collide.
    #[must_use]
    pub fn upload_object_key(
        &self,
        evaluation_id: EvaluationId,
        user_id: UserId,
        at: DateTime<Utc>,
    ) -> String {
        format!(
            "course{}_module{}_step{}_userId{}_eval{}_{}.png",
            self.course_id,
            self.module_id,
            self.step_id,
            user_id,
            evaluation_id,
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
    }
}
