//! Embedding scenarios
//!
//! A host clones interpreters onto worker threads, cancels them from
//! outside and reaches the same function through every call form.

use bytecode_system::{ClassBuilder, CodeBuilder, FunctionBuilder, ModuleBuilder, Opcode, TypeRef};
use core_types::{QualifiedName, Value};
use integration_tests::support::interpreter;
use interpreter::{HostError, Interpreter};
use std::thread;
use std::time::Duration;

fn triple_module() -> ModuleBuilder {
    let mut code = CodeBuilder::new();
    code.emit(Opcode::GetLocal(0))
        .emit(Opcode::PushNumber(3.0))
        .emit(Opcode::Mul)
        .emit(Opcode::ReturnValue);
    let mut module = ModuleBuilder::new("triple");
    module.function(FunctionBuilder::new("triple").args(1).code(code.finish().unwrap()));
    module
}

#[test]
fn clone_runs_on_its_own_thread() {
    let mut master = interpreter();
    master.load_record(triple_module().build()).unwrap();

    let mut clone = Interpreter::clone_of(&master).unwrap();
    let worker = thread::spawn(move || {
        clone.set_global("fromWorker", Value::Boolean(true)).unwrap();
        clone.run_function("triple", &[Value::Number(5.0)]).unwrap()
    });
    assert_eq!(worker.join().unwrap(), Value::Number(15.0));

    assert_eq!(
        master.run_function("triple", &[Value::Number(2.0)]).unwrap(),
        Value::Number(6.0)
    );
    assert_eq!(master.global_value("fromWorker").unwrap(), None);
}

#[test]
fn cancel_from_another_thread_stops_a_loop() {
    let mut vm = interpreter();
    let mut code = CodeBuilder::new();
    let top = code.label_here();
    code.jump(top);
    let mut module = ModuleBuilder::new("spin");
    module.function(FunctionBuilder::new("spin").code(code.finish().unwrap()));
    vm.load_record(module.build()).unwrap();

    let handle = vm.cancel_handle();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        handle.cancel();
    });
    assert_eq!(vm.run_function("spin", &[]).unwrap_err(), HostError::Cancelled);
    canceller.join().unwrap();

    vm.load_record(triple_module().build()).unwrap();
    assert_eq!(
        vm.run_function("triple", &[Value::Number(1.0)]).unwrap(),
        Value::Number(3.0)
    );
}

#[test]
fn fixups_resolve_once() {
    let mut vm = interpreter();
    let mut first = ModuleBuilder::new("shapes");
    first.class(ClassBuilder::new("Square").base(TypeRef::named("Shape")));
    first.class(ClassBuilder::new("Shape"));
    vm.load_record(first.build()).unwrap();
    assert_eq!(vm.resolve_fixups().unwrap(), 0);

    let mut second = ModuleBuilder::new("more_shapes");
    second.depends_on("shapes");
    second.class(ClassBuilder::new("Cube").base(TypeRef::named("Square")));
    vm.load_record(second.build()).unwrap();
    assert_eq!(vm.resolve_fixups().unwrap(), 0);
    vm.run_initializers().unwrap();

    let shape = vm.global_value("Shape").unwrap().unwrap().as_object().unwrap();
    let cube = vm.global_value("Cube").unwrap().unwrap().as_object().unwrap();
    assert!(vm.is_subtype_of(cube, shape));
}

#[test]
fn every_call_form_reaches_the_same_function() {
    let mut vm = interpreter();
    vm.load_record(triple_module().build()).unwrap();
    let global = vm.global();
    let slot = vm
        .lookup_own(global, &QualifiedName::public("triple"))
        .unwrap()
        .unwrap();

    let mut module = ModuleBuilder::new("callers");
    module.depends_on("triple");
    let name = module.constant("triple");

    let mut by_slot = CodeBuilder::new();
    by_slot
        .emit(Opcode::PushNumber(7.0))
        .emit(Opcode::CallGlobalSlot { slot, argc: 1 })
        .emit(Opcode::ReturnValue);
    module.function(FunctionBuilder::new("bySlot").code(by_slot.finish().unwrap()));

    let mut by_name = CodeBuilder::new();
    by_name
        .emit(Opcode::PushNumber(7.0))
        .emit(Opcode::CallName { name, argc: 1 })
        .emit(Opcode::ReturnValue);
    module.function(FunctionBuilder::new("byName").code(by_name.finish().unwrap()));

    let mut by_receiver = CodeBuilder::new();
    by_receiver
        .emit(Opcode::PushGlobal)
        .emit(Opcode::PushNumber(7.0))
        .emit(Opcode::CallObjName { name, argc: 1 })
        .emit(Opcode::ReturnValue);
    module.function(FunctionBuilder::new("byReceiver").code(by_receiver.finish().unwrap()));

    let mut by_value = CodeBuilder::new();
    by_value
        .emit(Opcode::GetName(name))
        .emit(Opcode::PushGlobal)
        .emit(Opcode::PushNumber(7.0))
        .emit(Opcode::Call { argc: 1 })
        .emit(Opcode::ReturnValue);
    module.function(FunctionBuilder::new("byValue").code(by_value.finish().unwrap()));

    vm.load_record(module.build()).unwrap();

    let direct = vm.run_function("triple", &[Value::Number(7.0)]).unwrap();
    assert_eq!(direct, Value::Number(21.0));
    for caller in ["bySlot", "byName", "byReceiver", "byValue"] {
        assert_eq!(vm.run_function(caller, &[]).unwrap(), direct, "{}", caller);
    }
}
