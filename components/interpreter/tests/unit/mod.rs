//! Unit tests for the interpreter's public building blocks
//!
//! These exercise the object model, core types and host surface one piece
//! at a time, without loading module records.

use core_types::{ErrorKind, QualifiedName, Value};
use interpreter::{
    error_slot, CancelHandle, HostError, Interpreter, InterpreterConfig, ModuleRegistry,
    CORE_GLOBAL_SLOTS,
};
use memory_manager::GcMode;

fn vm() -> Interpreter {
    Interpreter::new(InterpreterConfig::default()).unwrap()
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_default_config() {
    let config = InterpreterConfig::default();
    assert_eq!(config.max_call_depth, 1024);
    assert!(!config.legacy_args);
    assert_eq!(config.search_path.len(), 1);
}

#[test]
fn test_cancel_handle_is_shared_by_clones() {
    let handle = CancelHandle::new();
    let remote = handle.clone();
    assert!(!handle.is_cancelled());
    remote.cancel();
    assert!(handle.is_cancelled());
}

// ============================================================================
// Core types
// ============================================================================

#[test]
fn test_core_types_are_bound_by_name() {
    let mut vm = vm();
    let global = vm.global();
    let object = vm.get_named(global, "Object").unwrap();
    assert_eq!(object, Value::Object(vm.core().object));
    let array = vm.get_named(global, "Array").unwrap();
    assert_eq!(array, Value::Object(vm.core().array));
}

#[test]
fn test_error_types_sit_at_fixed_slots() {
    let vm = vm();
    let global = vm.global();
    let slot = error_slot(ErrorKind::TypeError);
    assert!(slot < CORE_GLOBAL_SLOTS);
    let bound = vm.obj(global).unwrap().props.get(slot).cloned();
    assert_eq!(
        bound,
        Some(Value::Object(vm.core().error_type(ErrorKind::TypeError)))
    );
}

#[test]
fn test_error_subtypes_derive_from_error() {
    let vm = vm();
    let core = vm.core();
    for kind in ErrorKind::ALL {
        let ty = core.error_type(kind);
        assert!(vm.is_subtype_of(ty, core.error));
        assert_eq!(core.error_kind(ty), Some(kind));
    }
}

#[test]
fn test_type_names() {
    let vm = vm();
    let core = vm.core();
    assert_eq!(vm.type_name(core.number), "Number");
    assert_eq!(vm.type_name(core.error_type(ErrorKind::RangeError)), "RangeError");
}

// ============================================================================
// Values and objects
// ============================================================================

#[test]
fn test_typeof_strings() {
    let mut vm = vm();
    let obj = vm.new_object().unwrap();
    assert_eq!(vm.typeof_str(&Value::Undefined), "undefined");
    assert_eq!(vm.typeof_str(&Value::Number(1.0)), "number");
    assert_eq!(vm.typeof_str(&Value::from("x")), "string");
    assert_eq!(vm.typeof_str(&Value::Object(obj)), "object");
}

#[test]
fn test_plain_object_properties() {
    let mut vm = vm();
    let obj = vm.new_object().unwrap();
    assert_eq!(vm.get_named(obj, "missing").unwrap(), Value::Undefined);
    vm.set_named(obj, "a", Value::Number(1.0)).unwrap();
    vm.set_named(obj, "a", Value::Number(2.0)).unwrap();
    assert_eq!(vm.get_named(obj, "a").unwrap(), Value::Number(2.0));
    assert_eq!(vm.obj(obj).unwrap().props.len(), 1);
}

#[test]
fn test_delete_leaves_undefined() {
    let mut vm = vm();
    let obj = vm.new_object().unwrap();
    vm.set_named(obj, "gone", Value::Boolean(true)).unwrap();
    let deleted = vm
        .delete_property(&Value::Object(obj), &QualifiedName::public("gone"))
        .unwrap();
    assert!(deleted);
    assert_eq!(vm.get_named(obj, "gone").unwrap(), Value::Undefined);
}

#[test]
fn test_array_elements() {
    let mut vm = vm();
    let array = vm
        .new_array(vec![Value::Number(1.0), Value::Number(2.0)])
        .unwrap();
    let array = Value::Object(array);
    assert_eq!(
        vm.get_index(&array, &Value::Number(1.0)).unwrap(),
        Value::Number(2.0)
    );
    vm.set_index(&array, &Value::Number(3.0), Value::Number(4.0))
        .unwrap();
    assert_eq!(
        vm.get_property(&array, &QualifiedName::public("length"))
            .unwrap(),
        Value::Number(4.0)
    );
    assert!(vm.instance_of(&array, vm.core().array));
}

#[test]
fn test_reading_from_null_is_a_reference_error() {
    let mut vm = vm();
    let error = vm
        .get_property(&Value::Null, &QualifiedName::public("x"))
        .unwrap_err();
    assert_eq!(vm.to_js_error(&error).kind, ErrorKind::ReferenceError);
}

#[test]
fn test_constructing_a_core_error() {
    let mut vm = vm();
    let ty = vm.core().error_type(ErrorKind::TypeError);
    let error = vm.construct(ty, &[Value::from("bad input")]).unwrap();
    assert!(vm.instance_of(&error, vm.core().error));
    let obj = error.as_object().unwrap();
    assert_eq!(vm.get_named(obj, "message").unwrap(), Value::from("bad input"));
}

// ============================================================================
// Host surface
// ============================================================================

#[test]
fn test_globals_set_by_the_host() {
    let mut vm = vm();
    assert_eq!(vm.global_value("answer").unwrap(), None);
    vm.set_global("answer", Value::Number(42.0)).unwrap();
    assert_eq!(vm.global_value("answer").unwrap(), Some(Value::Number(42.0)));
}

#[test]
fn test_calling_a_number_is_a_type_error() {
    let mut vm = vm();
    vm.set_global("notFunction", Value::Number(1.0)).unwrap();
    match vm.run_function("notFunction", &[]) {
        Err(HostError::Uncaught(error)) => assert_eq!(error.kind, ErrorKind::TypeError),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_fresh_interpreter_has_nothing_loaded() {
    let vm = vm();
    assert!(vm.loaded_modules().is_empty());
}

#[test]
fn test_rooted_values_survive_collection() {
    let mut vm = vm();
    let obj = vm.new_object().unwrap();
    let mark = vm.root_mark();
    vm.root(Value::Object(obj));
    vm.collect_garbage(GcMode::Full);
    assert!(vm.heap().get(obj).is_some());
    vm.unroot_to(mark);
    vm.collect_garbage(GcMode::Full);
    assert!(vm.heap().get(obj).is_none());
}

#[test]
fn test_registry_starts_empty() {
    let registry = ModuleRegistry::new();
    assert!(registry.is_empty());
    assert!(registry.get("anything").is_none());
}
