#![forbid(unsafe_code)]

pub mod comment_service;
pub mod error;
pub mod progress_service;

pub use course_core::Clock;

pub use comment_service::{CommentService, StepCommentView, UpvoteState};
pub use error::{CommentServiceError, ProgressError, SubmissionError};
pub use progress_service::ProgressService;
