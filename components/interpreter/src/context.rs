//! Interpreter configuration and the attention checkpoint state.

use memory_manager::GcConfig;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Tunables for one interpreter.
#[derive(Debug, Clone)]
pub struct InterpreterConfig {
    /// Capacity of the evaluation stack, in values
    pub stack_size: usize,
    /// Maximum number of active frames
    pub max_call_depth: usize,
    /// Maximum number of dispatch loops nested on the Rust stack by
    /// getters, constructors, natives and host calls
    pub max_native_depth: usize,
    /// Pad and truncate arguments for every function, not only those
    /// declared with legacy argument handling
    pub legacy_args: bool,
    /// Directories searched for `<name>.mod.json`
    pub search_path: Vec<PathBuf>,
    /// Collector settings
    pub gc: GcConfig,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        InterpreterConfig {
            stack_size: 64 * 1024,
            max_call_depth: 1024,
            max_native_depth: 32,
            legacy_args: false,
            search_path: vec![PathBuf::from(".")],
            gc: GcConfig::default(),
        }
    }
}

/// Why the dispatch loop must stop at its next checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Attention {
    /// Keep running
    #[default]
    None,
    /// An exception is waiting to be delivered
    ExceptionPending,
    /// The collector asked for a collection
    GcRequested,
    /// The host asked the interpreter to stop
    HostCancelRequested,
}

/// Notifications delivered to the host callback.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// Live memory passed the low-memory mark
    LowMemory {
        /// Estimated live bytes
        live_bytes: usize,
    },
    /// The heap entered degraded mode; the host should shut down
    Degraded,
    /// An exception reached the top of the call stack
    UncaughtException {
        /// Formatted message with backtrace
        report: String,
    },
}

/// Requests termination of a running interpreter from another thread.
///
/// The interpreter observes the request at its next instruction boundary.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    flag: Arc<AtomicBool>,
}

impl CancelHandle {
    /// A handle with no pending request.
    pub fn new() -> Self {
        CancelHandle::default()
    }

    /// Asks the interpreter to stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// True if a stop was requested and not yet consumed.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Consumes a pending request.
    pub(crate) fn take(&self) -> bool {
        self.flag.swap(false, Ordering::AcqRel)
    }
}
