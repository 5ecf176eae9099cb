//! Shared error types for the services crate.

use thiserror::Error;

use course_core::model::CommentError;
use course_core::object_url::ObjectUrlError;
use storage::repository::StorageError;

/// Errors emitted by the read-side aggregations of `ProgressService`.
///
/// Aggregations are all-or-nothing: when one of these is returned no partial
/// tally, completion set or report was produced.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgressError {
    #[error("failed to fetch progress data: {0}")]
    Fetch(#[from] StorageError),
    #[error("failed to resolve submission url: {0}")]
    UrlResolution(#[from] ObjectUrlError),
}

/// Errors emitted when recording a new attempt or a grade.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubmissionError {
    #[error("failed to persist attempt: {0}")]
    Persistence(#[from] StorageError),
}

/// Errors emitted by `CommentService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CommentServiceError {
    #[error(transparent)]
    Comment(#[from] CommentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
