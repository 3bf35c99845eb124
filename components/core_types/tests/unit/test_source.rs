//! Unit tests for SourcePosition and StackFrame

use core_types::{SourcePosition, StackFrame};

#[cfg(test)]
mod source_position_tests {
    use super::*;

    #[test]
    fn test_source_position_equality() {
        let a = SourcePosition {
            line: 1,
            column: 1,
            offset: 0,
        };
        assert_eq!(a.clone(), a);
    }
}

#[cfg(test)]
mod stack_frame_tests {
    use super::*;

    #[test]
    fn test_stack_frame_builder() {
        let frame = StackFrame::new("run").with_location("main.es", 40);
        assert_eq!(frame.function_name.as_deref(), Some("run"));
        assert_eq!(frame.source_url.as_deref(), Some("main.es"));
        assert_eq!(frame.line, 40);
    }

    #[test]
    fn test_stack_frame_display_variants() {
        assert_eq!(StackFrame::new("f").to_string(), "f");
        assert_eq!(
            StackFrame::new("f").with_location("a.es", 0).to_string(),
            "f (a.es)"
        );
        assert_eq!(
            StackFrame::new("area")
                .with_owner("Circle")
                .with_location("a.es", 9)
                .to_string(),
            "Circle.area (a.es:9)"
        );
    }
}
