use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::ids::{EvaluationId, StepId};

//
// ─── EVALUATION KIND ───────────────────────────────────────────────────────────
//

/// Type tag of an evaluation definition.
///
/// Authors may use any tag; only `"image"` changes how submitted content is
/// presented (the stored object key is resolved into a storage URL).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EvaluationKind {
    Image,
    Other(String),
}

impl EvaluationKind {
    pub const IMAGE_TAG: &'static str = "image";

    #[must_use]
    pub fn from_tag(tag: impl Into<String>) -> Self {
        let tag = tag.into();
        if tag == Self::IMAGE_TAG {
            Self::Image
        } else {
            Self::Other(tag)
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            EvaluationKind::Image => Self::IMAGE_TAG,
            EvaluationKind::Other(tag) => tag,
        }
    }

    #[must_use]
    pub fn is_image(&self) -> bool {
        matches!(self, EvaluationKind::Image)
    }
}

impl fmt::Display for EvaluationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EvaluationKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EvaluationKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from_tag)
    }
}

//
// ─── DEFINITION ────────────────────────────────────────────────────────────────
//

/// An authored question or check within a step.
///
/// Definitions are owned by content authors; the progress logic only reads
/// them. `order` is expected to be unique within a step but nothing enforces
/// it, so consumers that sort must do so stably.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationDefinition {
    pub id: EvaluationId,
    pub step_id: StepId,
    pub order: i32,
    pub instruction: String,
    pub kind: EvaluationKind,
    pub question: String,
    /// Reward weight granted when the evaluation is passed.
    pub gems: u32,
}

impl EvaluationDefinition {
    #[must_use]
    pub fn new(
        id: EvaluationId,
        step_id: StepId,
        order: i32,
        kind: EvaluationKind,
        gems: u32,
    ) -> Self {
        Self {
            id,
            step_id,
            order,
            instruction: String::new(),
            kind,
            question: String::new(),
            gems,
        }
    }

    #[must_use]
    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    #[must_use]
    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = question.into();
        self
    }
}
