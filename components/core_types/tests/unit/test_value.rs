//! Unit tests for Value

use core_types::{GcRef, Value};

#[cfg(test)]
mod value_creation_tests {
    use super::*;

    #[test]
    fn test_value_default_is_undefined() {
        assert!(matches!(Value::default(), Value::Undefined));
    }

    #[test]
    fn test_value_from_primitives() {
        assert_eq!(Value::from(true), Value::Boolean(true));
        assert_eq!(Value::from(3), Value::Number(3.0));
        assert_eq!(Value::from(2.5), Value::Number(2.5));
        assert_eq!(Value::from("hi"), Value::string("hi"));
        assert_eq!(Value::from(String::from("hi")).as_str(), Some("hi"));
    }

    #[test]
    fn test_value_from_gc_ref() {
        let r = GcRef::default();
        let value = Value::from(r);
        assert_eq!(value.as_object(), Some(r));
        assert_eq!(value.type_of(), "object");
    }
}

#[cfg(test)]
mod value_conversion_tests {
    use super::*;

    #[test]
    fn test_type_of_all_variants() {
        assert_eq!(Value::Undefined.type_of(), "undefined");
        assert_eq!(Value::Null.type_of(), "object");
        assert_eq!(Value::Boolean(false).type_of(), "boolean");
        assert_eq!(Value::Number(1.0).type_of(), "number");
        assert_eq!(Value::from("s").type_of(), "string");
    }

    #[test]
    fn test_nullish() {
        assert!(Value::Undefined.is_nullish());
        assert!(Value::Null.is_nullish());
        assert!(!Value::Number(0.0).is_nullish());
        assert!(!Value::from("").is_nullish());
    }

    #[test]
    fn test_accessors_reject_other_variants() {
        assert_eq!(Value::from("1").as_number(), None);
        assert_eq!(Value::Number(1.0).as_str(), None);
        assert_eq!(Value::Null.as_object(), None);
    }

    #[test]
    fn test_string_to_number() {
        assert_eq!(Value::from("3.25").to_number(), 3.25);
        assert_eq!(Value::from("-Infinity").to_number(), f64::NEG_INFINITY);
        assert!(Value::from("12px").to_number().is_nan());
    }
}

#[cfg(test)]
mod value_display_tests {
    use super::*;

    #[test]
    fn test_display_primitives() {
        assert_eq!(Value::Undefined.to_string(), "undefined");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(Value::Boolean(true).to_string(), "true");
        assert_eq!(Value::from("text").to_string(), "text");
    }

    #[test]
    fn test_display_large_and_small_numbers() {
        assert_eq!(Value::Number(1e21).to_string(), "1e21");
        assert_eq!(Value::Number(123456789.0).to_string(), "123456789");
        assert_eq!(Value::Number(f64::INFINITY).to_string(), "Infinity");
    }

    #[test]
    fn test_display_object() {
        assert_eq!(Value::Object(GcRef::default()).to_string(), "[object Object]");
    }
}
