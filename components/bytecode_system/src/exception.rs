//! Exception handler records.

use crate::module::TypeRef;
use serde::{Deserialize, Serialize};

/// What a handler does when its try range faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandlerKind {
    /// Catch matching exceptions and continue in the handler
    Catch,
    /// Run the handler, then resume the pending exception
    Finally,
}

/// One entry of a function's exception table.
///
/// Ranges are half-open instruction index ranges. Handlers are searched in
/// table order, so inner handlers must precede outer ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionRecord {
    /// Catch or finally
    pub kind: HandlerKind,
    /// First instruction covered
    pub try_start: u32,
    /// One past the last instruction covered
    pub try_end: u32,
    /// First instruction of the handler
    pub handler_start: u32,
    /// One past the last instruction of the handler
    pub handler_end: u32,
    /// Type a catch matches (or any value when `None`); unused for finally
    #[serde(default)]
    pub catch_type: Option<TypeRef>,
    /// Number of lexical blocks open at the try statement
    #[serde(default)]
    pub block_depth: u32,
}

impl ExceptionRecord {
    /// True if `pc` is inside the try range.
    pub fn covers(&self, pc: u32) -> bool {
        self.try_start <= pc && pc < self.try_end
    }

    /// True if `pc` is inside the handler body.
    pub fn in_handler(&self, pc: u32) -> bool {
        self.handler_start <= pc && pc < self.handler_end
    }
}
