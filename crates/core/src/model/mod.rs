mod attempt;
mod comment;
mod evaluation;
mod ids;
mod step;

pub use ids::{
    AttemptId, CommentId, CourseId, EvaluationId, ModuleId, ParseIdError, StepId, UserId,
};

pub use attempt::{GradeOutcome, NewAttempt, UserAttempt};
pub use comment::{CommentError, CommentUpvote, NewComment, StepComment};
pub use evaluation::{EvaluationDefinition, EvaluationKind};
pub use step::StepLocation;
