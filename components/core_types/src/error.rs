//! Error taxonomy and host-facing errors.
//!
//! Every kind here is an ordinary script-visible exception type. The
//! interpreter creates one core type per kind; [`JsError`] is the form an
//! uncaught exception takes once it leaves the interpreter.

use crate::{SourcePosition, StackFrame};
use std::fmt;

/// The kind of a script error.
///
/// Each variant corresponds to a core error type of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Wrong number of arguments
    ArgError,
    /// Arithmetic failure
    ArithmeticError,
    /// Failed assertion
    AssertError,
    /// Malformed bytecode
    InstructionError,
    /// I/O failure
    IOError,
    /// Engine invariant violation
    InternalError,
    /// Allocation exhausted
    MemoryError,
    /// Index out of bounds
    OutOfBoundsError,
    /// Null/undefined dereference or undefined name
    ReferenceError,
    /// Resource limit exceeded
    ResourceError,
    /// Operation invalid in the current object state
    StateError,
    /// Syntax error reported by a loader or compiler
    SyntaxError,
    /// Bad cast or wrong argument type
    TypeError,
    /// Malformed URI
    URIError,
}

impl ErrorKind {
    /// All kinds, in the order their core types are created.
    pub const ALL: [ErrorKind; 14] = [
        ErrorKind::ArgError,
        ErrorKind::ArithmeticError,
        ErrorKind::AssertError,
        ErrorKind::InstructionError,
        ErrorKind::IOError,
        ErrorKind::InternalError,
        ErrorKind::MemoryError,
        ErrorKind::OutOfBoundsError,
        ErrorKind::ReferenceError,
        ErrorKind::ResourceError,
        ErrorKind::StateError,
        ErrorKind::SyntaxError,
        ErrorKind::TypeError,
        ErrorKind::URIError,
    ];

    /// The name of the core type representing this kind.
    pub fn type_name(self) -> &'static str {
        match self {
            ErrorKind::ArgError => "ArgError",
            ErrorKind::ArithmeticError => "ArithmeticError",
            ErrorKind::AssertError => "AssertError",
            ErrorKind::InstructionError => "InstructionError",
            ErrorKind::IOError => "IOError",
            ErrorKind::InternalError => "InternalError",
            ErrorKind::MemoryError => "MemoryError",
            ErrorKind::OutOfBoundsError => "OutOfBoundsError",
            ErrorKind::ReferenceError => "ReferenceError",
            ErrorKind::ResourceError => "ResourceError",
            ErrorKind::StateError => "StateError",
            ErrorKind::SyntaxError => "SyntaxError",
            ErrorKind::TypeError => "TypeError",
            ErrorKind::URIError => "URIError",
        }
    }

    /// Maps a core type name back to its kind.
    pub fn from_type_name(name: &str) -> Option<ErrorKind> {
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.type_name() == name)
    }

    /// Position of this kind in [`ErrorKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// An uncaught script error with its backtrace.
///
/// # Examples
///
/// ```
/// use core_types::{JsError, ErrorKind, StackFrame};
///
/// let mut error = JsError::new(ErrorKind::TypeError, "bad cast");
/// error.stack.push(StackFrame::new("g").with_location("app.es", 4));
///
/// assert_eq!(error.to_string(), "TypeError: bad cast");
/// assert!(error.backtrace_report().contains("at g (app.es:4)"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct JsError {
    /// The type of error
    pub kind: ErrorKind,
    /// Human-readable error message
    pub message: String,
    /// Backtrace captured at throw time, innermost frame first
    pub stack: Vec<StackFrame>,
    /// Source position where the error occurred
    pub source_position: Option<SourcePosition>,
}

impl JsError {
    /// Creates an error with an empty backtrace.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        JsError {
            kind,
            message: message.into(),
            stack: Vec::new(),
            source_position: None,
        }
    }

    /// Attaches a backtrace.
    pub fn with_stack(mut self, stack: Vec<StackFrame>) -> Self {
        self.stack = stack;
        self
    }

    /// The message followed by one `at ...` line per frame.
    pub fn backtrace_report(&self) -> String {
        let mut report = self.to_string();
        for frame in &self.stack {
            report.push_str("\n    at ");
            report.push_str(&frame.to_string());
        }
        report
    }
}
