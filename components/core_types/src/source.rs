//! Source position and stack frame types for error tracking.

use std::fmt;

/// Represents a position in source code.
///
/// # Examples
///
/// ```
/// use core_types::SourcePosition;
///
/// let pos = SourcePosition {
///     line: 10,
///     column: 5,
///     offset: 150,
/// };
///
/// assert_eq!(pos.line, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePosition {
    /// Line number (1-indexed)
    pub line: u32,
    /// Column number (1-indexed, 0 when unknown)
    pub column: u32,
    /// Byte offset from the start of the source file
    pub offset: usize,
}

/// A single frame of a captured backtrace.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame::new("area")
///     .with_owner("Shape")
///     .with_location("shapes.es", 12);
///
/// assert_eq!(frame.to_string(), "Shape.area (shapes.es:12)");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    /// Name of the function, or None for anonymous functions
    pub function_name: Option<String>,
    /// Name of the type owning the function, if it is a method
    pub owner: Option<String>,
    /// Module file the code came from, or None if not available
    pub source_url: Option<String>,
    /// Line number of the executing instruction (0 when unknown)
    pub line: u32,
    /// Column number of the executing instruction (0 when unknown)
    pub column: u32,
}

impl StackFrame {
    /// Creates a frame for the named function with no location.
    pub fn new(function_name: impl Into<String>) -> Self {
        let name = function_name.into();
        StackFrame {
            function_name: if name.is_empty() { None } else { Some(name) },
            owner: None,
            source_url: None,
            line: 0,
            column: 0,
        }
    }

    /// Sets the owning type name.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    /// Sets file and line.
    pub fn with_location(mut self, file: impl Into<String>, line: u32) -> Self {
        self.source_url = Some(file.into());
        self.line = line;
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(owner) = &self.owner {
            write!(f, "{}.", owner)?;
        }
        f.write_str(self.function_name.as_deref().unwrap_or("<anonymous>"))?;
        match (&self.source_url, self.line) {
            (Some(file), 0) => write!(f, " ({})", file),
            (Some(file), line) => write!(f, " ({}:{})", file, line),
            (None, 0) => Ok(()),
            (None, line) => write!(f, " (line {})", line),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_frame() {
        let frame = StackFrame::new("");
        assert_eq!(frame.function_name, None);
        assert_eq!(frame.to_string(), "<anonymous>");
    }

    #[test]
    fn test_frame_without_file() {
        let mut frame = StackFrame::new("f");
        frame.line = 3;
        assert_eq!(frame.to_string(), "f (line 3)");
    }
}
