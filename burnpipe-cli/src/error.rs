//! CLI error type and exit codes.

use std::fmt;

use burnpipe::{BurnError, BurnResult, Failure};

/// Errors surfaced to the user by the `burnpipe` binary.
#[derive(Debug)]
pub enum CliError {
    /// Bad arguments or configuration.
    Config(String),
    /// The engine refused or failed an operation before a run started.
    Engine(BurnError),
    /// A pipeline run completed with a failure.
    Run(Failure),
    /// The user interrupted the operation.
    Cancelled,
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Cancelled => 130,
            CliError::Run(failure) if failure.result == BurnResult::Cancelled => 130,
            CliError::Config(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Engine(e) => write!(f, "{}", e),
            CliError::Run(failure) => write!(f, "Run {}: {}", failure.result, failure.error),
            CliError::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Engine(e) => Some(e),
            CliError::Run(failure) => Some(&failure.error),
            _ => None,
        }
    }
}

impl From<BurnError> for CliError {
    fn from(e: BurnError) -> Self {
        match e {
            BurnError::Config(msg) => CliError::Config(msg),
            BurnError::Cancelled => CliError::Cancelled,
            other => CliError::Engine(other),
        }
    }
}

impl From<Failure> for CliError {
    fn from(failure: Failure) -> Self {
        CliError::Run(failure)
    }
}
