use anyhow::Error;
use thiserror::Error;

/// Run-level error types for s3mirror-rs.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 0: Cancelled by the user
/// - 1: Run errors (Listing, Session, WorkersExhausted, WarningsAsError, Pipeline)
/// - 2: Configuration errors (InvalidConfig, InvalidUri)
///
/// A run that drained with failed objects is not an error; it is reported
/// through the pipeline's warning flag and exits with code 3.
#[derive(Error, Debug, PartialEq)]
pub enum S3mirrorError {
    /// Configuration error (non-retryable).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid `bucket[/prefix]` argument.
    #[error("Invalid S3 path: {0}")]
    InvalidUri(String),

    /// Enumeration of the source failed. Already queued objects still drain.
    #[error("Listing failed: {0}")]
    Listing(String),

    /// A worker could not construct a client session.
    #[error("Session construction failed: {0}")]
    Session(String),

    /// Every worker exited before the queue drained.
    #[error("All workers exited; {abandoned} queued objects were abandoned")]
    WorkersExhausted { abandoned: u64 },

    /// Operation cancelled by user.
    #[error("Operation cancelled by user")]
    Cancelled,

    /// Some objects failed and warnings are treated as errors.
    #[error("{failed} objects failed to replicate ({copied} copied) and warnings are treated as errors")]
    WarningsAsError { copied: u64, failed: u64 },

    /// General pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl S3mirrorError {
    pub fn exit_code(&self) -> i32 {
        match self {
            S3mirrorError::Cancelled => 0,
            S3mirrorError::InvalidConfig(_) | S3mirrorError::InvalidUri(_) => 2,
            _ => 1,
        }
    }
}

/// Recoverable failure of a single object.
///
/// A worker turns any of these into a log line, a warning and a
/// `mark_done`; none of them stops the worker.
#[derive(Error, Debug)]
pub enum ObjectCopyError {
    #[error("failed to describe source object {key}: {cause:#}")]
    DescribeSource { key: String, cause: Error },

    #[error("failed to describe target object {key}: {cause:#}")]
    DescribeTarget { key: String, cause: Error },

    #[error("failed to copy {source_key} to {target_key}: {cause:#}")]
    Copy {
        source_key: String,
        target_key: String,
        cause: Error,
    },

    #[error("failed to get ACL of {key}: {cause:#}")]
    GetAcl { key: String, cause: Error },

    #[error("failed to set ACL of {key}: {cause:#}")]
    SetAcl { key: String, cause: Error },

    #[error("no session available for {key}: {cause:#}")]
    Session { key: String, cause: Error },
}

impl ObjectCopyError {
    /// Whether the failure happened after the object bytes were copied.
    pub fn is_after_copy(&self) -> bool {
        matches!(
            self,
            ObjectCopyError::GetAcl { .. } | ObjectCopyError::SetAcl { .. }
        )
    }
}

pub fn is_cancelled_error(e: &Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3mirrorError>() {
        return *err == S3mirrorError::Cancelled;
    }
    false
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<S3mirrorError>() {
        return err.exit_code();
    }
    1
}
