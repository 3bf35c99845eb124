//! Core value types and error handling for the Ejs runtime.
//!
//! This crate provides the foundational types shared by every other
//! component: value representation, qualified property names, the error
//! taxonomy and backtrace frames.
//!
//! # Overview
//!
//! - [`Value`] - Tagged representation of script values
//! - [`GcRef`] - Handle to an object living in the managed heap
//! - [`QualifiedName`] - Namespace-qualified property name
//! - [`JsError`] - Host-facing error with a captured backtrace
//! - [`ErrorKind`] - The fixed error taxonomy
//! - [`SourcePosition`] - Source code location
//! - [`StackFrame`] - Call stack frame information
//!
//! # Examples
//!
//! ```
//! use core_types::{Value, JsError, ErrorKind};
//!
//! let num = Value::Number(42.0);
//! assert!(num.is_truthy());
//! assert_eq!(num.type_of(), "number");
//!
//! let error = JsError::new(ErrorKind::TypeError, "undefined is not a function");
//! assert_eq!(error.to_string(), "TypeError: undefined is not a function");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

mod error;
mod name;
mod source;
mod value;

pub use error::{ErrorKind, JsError};
pub use name::QualifiedName;
pub use source::{SourcePosition, StackFrame};
pub use value::{GcRef, Value};
