//! Interpreter errors.

use bytecode_system::ModuleError;
use core_types::{JsError, Value};
use memory_manager::GcError;
use thiserror::Error;

/// Errors that leave an interpreter operation.
///
/// `Thrown` is an ordinary script exception and may still be caught by an
/// outer frame. The other variants are fatal to the current run and are
/// never delivered to script handlers.
#[derive(Debug, Clone, Error)]
pub enum VmError {
    /// A script exception in flight
    #[error("uncaught exception {0:?}")]
    Thrown(Value),
    /// Engine failure that script cannot observe
    #[error("fatal: {0}")]
    Fatal(JsError),
    /// The host requested termination
    #[error("execution cancelled by the host")]
    Cancelled,
    /// Module loading failed
    #[error(transparent)]
    Load(#[from] ModuleError),
}

impl From<GcError> for VmError {
    fn from(error: GcError) -> Self {
        VmError::Fatal(JsError::new(
            core_types::ErrorKind::MemoryError,
            error.to_string(),
        ))
    }
}

/// Result of interpreter operations.
pub type VmResult<T> = Result<T, VmError>;

/// Errors returned to embedding hosts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// An uncaught script exception
    #[error("{}", .0.backtrace_report())]
    Uncaught(JsError),
    /// A fatal engine error
    #[error("{0}")]
    Fatal(JsError),
    /// The host cancelled the run
    #[error("execution cancelled by the host")]
    Cancelled,
    /// Module loading failed
    #[error(transparent)]
    Load(#[from] ModuleError),
}

impl HostError {
    /// The script error, for uncaught and fatal errors.
    pub fn js_error(&self) -> Option<&JsError> {
        match self {
            HostError::Uncaught(error) | HostError::Fatal(error) => Some(error),
            _ => None,
        }
    }
}
