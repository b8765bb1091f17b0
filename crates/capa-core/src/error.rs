//! Error taxonomy for problem construction and grading.
//!
//! Errors are classified by who can act on them: authors (parse and grader
//! configuration errors), students (input errors), or operators (queue,
//! sandbox and unexpected failures). The grading loop uses these variants to
//! decide whether a failure degrades one answer or the whole submission.

use thiserror::Error;

use crate::calc::CalcError;

/// Message shown to learners when a failure must not leak internals.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "This problem is temporarily unavailable. Please try again later.";

/// Errors raised by the problem engine.
#[derive(Debug, Error)]
pub enum CapaError {
    /// Malformed problem source; the problem cannot be instantiated.
    #[error("problem parse error: {0}")]
    Parse(String),

    /// Malformed expression handed to the evaluator.
    #[error(transparent)]
    Evaluation(#[from] CalcError),

    /// A recoverable, user-facing problem with a submitted answer.
    #[error("{0}")]
    StudentInput(String),

    /// Authored content is internally inconsistent.
    #[error("grader configuration error: {0}")]
    GraderConfiguration(String),

    /// A grader failed while evaluating a submission (e.g. an author script raised).
    #[error("response error: {0}")]
    Response(String),

    /// The external grading channel refused or failed the request.
    #[error("queue communication error: {0}")]
    QueueCommunication(#[from] QueueError),

    /// The script sandbox failed to run author code.
    #[error("script error: {0}")]
    Sandbox(#[from] SandboxError),

    /// The template renderer failed.
    #[error("template error: {0}")]
    Template(String),

    /// An operation is not allowed in the problem's current state.
    #[error("invalid problem state: {0}")]
    InvalidState(String),
}

impl CapaError {
    /// Returns `true` if the error can be shown to the student as-is.
    pub fn is_student_facing(&self) -> bool {
        matches!(self, CapaError::StudentInput(_) | CapaError::Evaluation(_))
    }

    /// Returns `true` if the failure is local to one response and must not
    /// abort grading of its siblings.
    pub fn is_response_local(&self) -> bool {
        matches!(
            self,
            CapaError::StudentInput(_)
                | CapaError::Evaluation(_)
                | CapaError::GraderConfiguration(_)
                | CapaError::Response(_)
                | CapaError::Sandbox(_)
        )
    }

    /// The message a learner should see for this error.
    pub fn learner_message(&self) -> String {
        if self.is_student_facing() {
            self.to_string()
        } else {
            GENERIC_FAILURE_MESSAGE.to_string()
        }
    }
}

/// Errors from the external grading queue.
///
/// Defined here so the grading loop can classify queue failures without
/// depending on the HTTP client crate.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The queue answered with a non-zero return code.
    #[error("queue rejected the submission (code {code}): {message}")]
    Rejected { code: i64, message: String },

    /// Login to the queue failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The queue returned an HTTP error status.
    #[error("queue HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    Network(String),

    /// No queue is configured for this problem.
    #[error("no grading queue configured")]
    NotConfigured,
}

impl QueueError {
    /// Returns `true` if retrying the same request cannot succeed.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            QueueError::AuthenticationFailed(_) | QueueError::NotConfigured
        )
    }
}

/// Errors from the embedded script sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    /// The script exceeded its wall-clock budget.
    #[error("script timed out after {0}ms")]
    Timeout(u64),

    /// The script exceeded an operation or size limit.
    #[error("script exceeded resource limit: {0}")]
    ResourceLimit(String),

    /// The script failed to compile or raised an error.
    #[error("{0}")]
    Script(String),

    /// A requested function is not defined by the problem scripts.
    #[error("function not found: {0}")]
    MissingFunction(String),

    /// A value could not be converted across the sandbox boundary.
    #[error("value conversion failed: {0}")]
    Conversion(String),

    /// The problem uses scripts but no sandbox is available.
    #[error("script execution is not available")]
    Unavailable,
}
