//! Error types for the CLI

use interpreter::HostError;
use thiserror::Error;

/// CLI-specific errors
#[derive(Debug, Error)]
pub enum CliError {
    /// Loading or running script failed
    #[error(transparent)]
    Host(#[from] HostError),

    /// Arguments were given without a function to pass them to
    #[error("arguments given without --run")]
    ArgsWithoutRun,
}

impl CliError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Host(HostError::Uncaught(_)) => 1,
            CliError::Host(HostError::Load(_)) | CliError::ArgsWithoutRun => 2,
            CliError::Host(HostError::Fatal(_)) => 3,
            CliError::Host(HostError::Cancelled) => 130,
        }
    }
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, CliError>;
