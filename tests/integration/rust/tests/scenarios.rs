//! Cross-component scenarios
//!
//! Each test drives the collector, the object model and the dispatch loop
//! together through modules assembled with the bytecode builders.

use bytecode_system::{
    ClassBuilder, CodeBuilder, ConstantValue, FunctionBuilder, ModuleBuilder, Opcode, TryRange,
    TypeRef,
};
use core_types::{ErrorKind, QualifiedName, Value};
use integration_tests::support::{interpreter, record_step};
use interpreter::{HostError, Interpreter, VmError};
use memory_manager::{GcMode, Generation};

fn global(vm: &mut Interpreter, name: &str) -> Value {
    vm.global_value(name).unwrap().unwrap()
}

// ============================================================================
// Scenario A: short-lived objects die in the new generation
// ============================================================================

#[test]
fn scenario_a_short_lived_objects_are_reclaimed() {
    let mut vm = interpreter();
    let mut code = CodeBuilder::new();
    code.emit(Opcode::PushNumber(0.0)).emit(Opcode::SetLocal(0));
    let top = code.label_here();
    let done = code.label();
    code.emit(Opcode::GetLocal(0))
        .emit(Opcode::PushNumber(1000.0))
        .emit(Opcode::Lt)
        .jump_if_false(done)
        .emit(Opcode::NewObject)
        .emit(Opcode::SetLocal(1))
        .emit(Opcode::GetLocal(0))
        .emit(Opcode::PushNumber(1.0))
        .emit(Opcode::Add)
        .emit(Opcode::SetLocal(0))
        .jump(top);
    code.bind(done);
    code.emit(Opcode::Return);
    let mut module = ModuleBuilder::new("churn");
    module.function(
        FunctionBuilder::new("churn")
            .locals(2)
            .code(code.finish().unwrap()),
    );
    vm.load_record(module.build()).unwrap();
    vm.collect_garbage(GcMode::Full);

    let baseline = vm.heap().live_count();
    let reclaimed_before = vm.heap().stats().reclaimed;
    vm.run_function("churn", &[]).unwrap();
    vm.collect_garbage(GcMode::Quick);

    assert_eq!(vm.heap().live_count(), baseline);
    assert!(vm.heap().stats().reclaimed - reclaimed_before >= 1000);
}

// ============================================================================
// Scenario B: a rooted object is promoted one generation at a time
// ============================================================================

#[test]
fn scenario_b_survivor_moves_up_exactly_one_generation() {
    let mut vm = interpreter();
    let obj = vm.new_object().unwrap();
    vm.set_global("kept", Value::Object(obj)).unwrap();
    assert_eq!(vm.heap().generation_of(obj), Some(Generation::NEW));

    vm.collect_garbage(GcMode::Quick);
    vm.collect_garbage(GcMode::Quick);
    assert_eq!(vm.heap().generation_of(obj), Some(Generation::YOUNG));
}

// ============================================================================
// Scenario C: named lookup on a large dynamic object
// ============================================================================

#[test]
fn scenario_c_delete_keeps_other_slots_stable() {
    let mut vm = interpreter();
    let obj = vm.new_object().unwrap();
    for i in 0..50 {
        vm.set_named(obj, &format!("p{}", i), Value::Number(i as f64))
            .unwrap();
    }
    let slots: Vec<u32> = (0..50)
        .map(|i| {
            let name = QualifiedName::public(format!("p{}", i));
            vm.obj(obj).unwrap().props.lookup(&name).unwrap()
        })
        .collect();
    for i in 0..50 {
        assert_eq!(
            vm.get_named(obj, &format!("p{}", i)).unwrap(),
            Value::Number(i as f64)
        );
    }

    let deleted = vm
        .delete_property(&Value::Object(obj), &QualifiedName::public("p24"))
        .unwrap();
    assert!(deleted);
    assert_eq!(vm.get_named(obj, "p24").unwrap(), Value::Undefined);
    for i in (0..50).filter(|&i| i != 24) {
        let name = QualifiedName::public(format!("p{}", i));
        let props = &vm.obj(obj).unwrap().props;
        assert_eq!(props.lookup(&name), Some(slots[i]));
        assert_eq!(props.get(slots[i]), Some(&Value::Number(i as f64)));
    }
}

// ============================================================================
// Scenario D: derived instances carry base and own properties
// ============================================================================

#[test]
fn scenario_d_inherited_instance_layout() {
    let mut vm = interpreter();
    let mut module = ModuleBuilder::new("layout");
    module.class(
        ClassBuilder::new("D")
            .base(TypeRef::named("B"))
            .instance_property("y", Some(ConstantValue::Number(2.0))),
    );
    module.class(ClassBuilder::new("B").instance_property("x", Some(ConstantValue::Number(1.0))));
    vm.load_record(module.build()).unwrap();
    vm.run_initializers().unwrap();

    let b = global(&mut vm, "B").as_object().unwrap();
    let d = global(&mut vm, "D").as_object().unwrap();
    let instance = vm.construct(d, &[]).unwrap().as_object().unwrap();

    assert_eq!(vm.get_named(instance, "x").unwrap(), Value::Number(1.0));
    assert_eq!(vm.get_named(instance, "y").unwrap(), Value::Number(2.0));
    let props = &vm.obj(instance).unwrap().props;
    assert_eq!(props.lookup(&QualifiedName::public("x")), Some(0));
    assert_eq!(props.lookup(&QualifiedName::public("y")), Some(1));
    assert!(vm.is_subtype_of(d, b));
    assert!(!vm.is_subtype_of(b, d));
}

// ============================================================================
// Scenario E: exceptions cross frames, finally blocks run once
// ============================================================================

fn propagation_module() -> ModuleBuilder {
    let mut module = ModuleBuilder::new("propagation");
    let trace = module.constant("trace");
    let caught = module.constant("caught");
    let type_error = module.constant("TypeError");
    let message = module.constant("wrong type");
    let g_name = module.constant("G");
    module.global("trace", Some(ConstantValue::Number(0.0)));
    module.global("caught", None);

    // G: try { throw new TypeError("wrong type") } finally { record 1 }
    let mut g = CodeBuilder::new();
    let try_start = g.label_here();
    g.emit(Opcode::GetName(type_error))
        .emit(Opcode::PushString(message))
        .emit(Opcode::New { argc: 1 })
        .emit(Opcode::Throw);
    let try_end = g.label_here();
    let handler_start = g.label_here();
    record_step(&mut g, trace, 1.0);
    g.emit(Opcode::EndFinally);
    let handler_end = g.label_here();
    g.emit(Opcode::Return);
    g.try_finally(TryRange {
        try_start,
        try_end,
        handler_start,
        handler_end,
        block_depth: 0,
    });
    module.function(FunctionBuilder::new("G").code(g.finish().unwrap()));

    // F: try { G() } catch (e: Error) { caught = e } finally { record 2 }
    let mut f = CodeBuilder::new();
    let after_catch = f.label();
    let try_start = f.label_here();
    f.emit(Opcode::CallName {
        name: g_name,
        argc: 0,
    })
    .emit(Opcode::Pop)
    .jump(after_catch);
    let try_end = f.label_here();
    let catch_start = f.label_here();
    f.emit(Opcode::GetLexicalSlot { level: 0, slot: 0 })
        .emit(Opcode::SetName(caught))
        .emit(Opcode::EndCatch);
    let catch_end = f.label_here();
    f.bind(after_catch);
    f.emit(Opcode::EnterFinally);
    let finally_start = f.label_here();
    record_step(&mut f, trace, 2.0);
    f.emit(Opcode::EndFinally);
    let finally_end = f.label_here();
    f.emit(Opcode::Return);
    f.try_catch(
        TryRange {
            try_start,
            try_end,
            handler_start: catch_start,
            handler_end: catch_end,
            block_depth: 0,
        },
        Some(TypeRef::named("Error")),
    );
    f.try_finally(TryRange {
        try_start,
        try_end: catch_end,
        handler_start: finally_start,
        handler_end: finally_end,
        block_depth: 0,
    });
    module.function(FunctionBuilder::new("F").code(f.finish().unwrap()));
    module
}

#[test]
fn scenario_e_exception_reaches_base_type_catch() {
    let mut vm = interpreter();
    vm.load_record(propagation_module().build()).unwrap();
    vm.run_function("F", &[]).unwrap();

    assert_eq!(global(&mut vm, "trace"), Value::Number(12.0));
    let caught = global(&mut vm, "caught");
    let type_error = vm.core().error_type(ErrorKind::TypeError);
    assert!(vm.instance_of(&caught, type_error));

    let error = vm.to_js_error(&VmError::Thrown(caught));
    assert_eq!(error.kind, ErrorKind::TypeError);
    assert_eq!(error.message, "wrong type");
    let names: Vec<_> = error
        .stack
        .iter()
        .filter_map(|frame| frame.function_name.as_deref())
        .collect();
    assert_eq!(names, vec!["G", "F"]);
}

#[test]
fn scenario_e_uncaught_exception_still_runs_finally_once() {
    let mut vm = interpreter();
    vm.load_record(propagation_module().build()).unwrap();
    match vm.run_function("G", &[]) {
        Err(HostError::Uncaught(error)) => {
            assert_eq!(error.kind, ErrorKind::TypeError);
            assert!(error.backtrace_report().contains("at G"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(global(&mut vm, "trace"), Value::Number(1.0));
}

// ============================================================================
// Scenario F: closures outlive the frame that made them
// ============================================================================

#[test]
fn scenario_f_closure_sees_latest_captured_value() {
    let mut vm = interpreter();
    let mut read = CodeBuilder::new();
    read.emit(Opcode::GetLexicalSlot { level: 1, slot: 0 })
        .emit(Opcode::ReturnValue);
    let mut outer = CodeBuilder::new();
    outer
        .emit(Opcode::PushNumber(10.0))
        .emit(Opcode::SetLocal(0))
        .emit(Opcode::MakeClosure(1))
        .emit(Opcode::PushNumber(20.0))
        .emit(Opcode::SetLocal(0))
        .emit(Opcode::ReturnValue);
    let mut module = ModuleBuilder::new("capture");
    module.function(
        FunctionBuilder::new("capture")
            .locals(2)
            .local(0, "value")
            .nested(1, FunctionBuilder::new("read").code(read.finish().unwrap()))
            .code(outer.finish().unwrap()),
    );
    vm.load_record(module.build()).unwrap();

    let closure = vm.run_function("capture", &[]).unwrap();
    vm.root(closure.clone());
    vm.collect_garbage(GcMode::Full);
    assert_eq!(
        vm.call_function(&closure, Value::Undefined, &[]).unwrap(),
        Value::Number(20.0)
    );
}
