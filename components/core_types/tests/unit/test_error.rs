//! Unit tests for JsError and ErrorKind

use core_types::{ErrorKind, JsError, SourcePosition, StackFrame};

#[cfg(test)]
mod error_kind_tests {
    use super::*;

    #[test]
    fn test_all_kinds_have_distinct_names() {
        let mut names: Vec<&str> = ErrorKind::ALL.iter().map(|k| k.type_name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ErrorKind::ALL.len());
    }

    #[test]
    fn test_kind_display_is_type_name() {
        assert_eq!(ErrorKind::URIError.to_string(), "URIError");
        assert_eq!(ErrorKind::IOError.to_string(), "IOError");
    }

    #[test]
    fn test_unknown_type_name() {
        assert_eq!(ErrorKind::from_type_name("RangeError"), None);
    }
}

#[cfg(test)]
mod js_error_tests {
    use super::*;

    #[test]
    fn test_js_error_new_has_no_stack() {
        let error = JsError::new(ErrorKind::MemoryError, "out of memory");
        assert!(error.stack.is_empty());
        assert!(error.source_position.is_none());
    }

    #[test]
    fn test_js_error_with_stack_report() {
        let error = JsError::new(ErrorKind::TypeError, "boom").with_stack(vec![
            StackFrame::new("g").with_location("m.es", 7),
            StackFrame::new("f").with_owner("Shape").with_location("m.es", 3),
        ]);
        let report = error.backtrace_report();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "TypeError: boom");
        assert_eq!(lines[1].trim(), "at g (m.es:7)");
        assert_eq!(lines[2].trim(), "at Shape.f (m.es:3)");
    }

    #[test]
    fn test_js_error_is_std_error() {
        fn takes_error(_: &dyn std::error::Error) {}
        let error = JsError::new(ErrorKind::StateError, "closed");
        takes_error(&error);
    }

    #[test]
    fn test_js_error_source_position() {
        let mut error = JsError::new(ErrorKind::SyntaxError, "unexpected token");
        error.source_position = Some(SourcePosition {
            line: 2,
            column: 9,
            offset: 31,
        });
        assert_eq!(error.source_position.as_ref().map(|p| p.line), Some(2));
    }
}
