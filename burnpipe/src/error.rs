//! Error and result types shared by the pipeline engine.
//!
//! Three different things are reported here and they are kept apart on
//! purpose:
//!
//! - [`BurnError`] is a real failure (protocol misuse, resource allocation,
//!   transfer I/O, stage failure).
//! - [`BurnResult`] is the result code carried through the error protocol and
//!   the multi-track control flow (`Retry`, `Fallback`, ...).
//! - [`Unavailable`] is what accessors hand back when the information asked
//!   for does not exist for the caller's position in the chain.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, BurnError>;

/// Errors that can occur while running a pipeline or a transfer.
#[derive(Debug, Error)]
pub enum BurnError {
    /// A stage used the chain in a way the finish protocol forbids.
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// Allocating a channel or a temporary path failed.
    #[error("failed to allocate {what}: {source}")]
    Resource {
        what: String,
        #[source]
        source: io::Error,
    },

    /// Stat or copy failure during a transfer.
    #[error("transfer failed for {}: {source}", path.display())]
    Transfer {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// A concrete stage reported a failure.
    #[error("stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    /// Requested feature or source type is not supported.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl BurnError {
    /// Build a resource error from an I/O failure.
    pub fn resource(what: impl Into<String>, source: io::Error) -> Self {
        Self::Resource {
            what: what.into(),
            source,
        }
    }

    /// Build a transfer error for `path`.
    pub fn transfer(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Transfer {
            path: path.into(),
            source,
        }
    }

    /// Build a stage failure.
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Returns true for [`BurnError::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The result code this error maps to before any remapping.
    pub fn default_result(&self) -> BurnResult {
        if self.is_cancelled() {
            BurnResult::Cancelled
        } else {
            BurnResult::Failed
        }
    }
}

/// Result code of an engine step.
///
/// `Ok` and `Retry` are control flow; the others travel through the error
/// protocol. `Fallback` is never produced by the engine itself, only by a
/// remap observer asking for an alternate stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BurnResult {
    /// Step completed.
    Ok,
    /// More tracks remain; the same stage runs again.
    Retry,
    /// The run was cancelled.
    Cancelled,
    /// The run failed.
    Failed,
    /// The run failed and an alternate stage should be tried.
    Fallback,
}

impl BurnResult {
    /// Returns true for `Ok` and `Retry`.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Retry)
    }
}

impl std::fmt::Display for BurnResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Retry => "retry",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Fallback => "fallback",
        };
        f.write_str(s)
    }
}

/// Typed "this does not apply" answer from accessors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unavailable {
    /// The information does not exist for this stage position.
    #[error("not applicable")]
    NotApplicable,
    /// The information exists but is not known yet.
    #[error("not ready")]
    NotReady,
    /// The run is not active (never started or already finalised).
    #[error("not running")]
    NotRunning,
}

/// Terminal failure of a run, as delivered to the completion callback.
#[derive(Debug, Error)]
#[error("run {result}: {error}")]
pub struct Failure {
    /// Result code after remapping.
    pub result: BurnResult,
    /// The error that ended the run.
    #[source]
    pub error: BurnError,
}

/// What the completion callback receives: exactly once per run.
pub type Completion = Result<(), Failure>;

/// Single-subscriber hook that may rewrite a stage's failure code.
pub type ErrorRemap = Box<dyn FnMut(BurnResult, &BurnError) -> BurnResult + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_error_display_carries_os_text() {
        let err = BurnError::resource(
            "pipe",
            io::Error::new(io::ErrorKind::Other, "too many open files"),
        );
        assert_eq!(
            err.to_string(),
            "failed to allocate pipe: too many open files"
        );
    }

    #[test]
    fn test_transfer_error_display_carries_path() {
        let err = BurnError::transfer(
            "/src/a.iso",
            io::Error::new(io::ErrorKind::NotFound, "missing"),
        );
        assert!(err.to_string().contains("/src/a.iso"));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_default_result() {
        assert_eq!(BurnError::Cancelled.default_result(), BurnResult::Cancelled);
        assert_eq!(
            BurnError::Protocol("x".into()).default_result(),
            BurnResult::Failed
        );
    }

    #[test]
    fn test_burn_result_success() {
        assert!(BurnResult::Ok.is_success());
        assert!(BurnResult::Retry.is_success());
        assert!(!BurnResult::Fallback.is_success());
        assert!(!BurnResult::Cancelled.is_success());
    }
}
