//! Contract tests for the interpreter's host API
//!
//! These tests pin down the observable behavior embedding hosts rely on:
//! what load, run and clone return, and which errors they report.

use bytecode_system::{
    CodeBuilder, ConstantValue, FunctionBuilder, ModuleBuilder, ModuleError, Opcode,
};
use core_types::{ErrorKind, Value};
use interpreter::{HostError, HostEvent, Interpreter, InterpreterConfig, VmResult};
use std::sync::{Arc, Mutex};

fn vm() -> Interpreter {
    Interpreter::new(InterpreterConfig::default()).unwrap()
}

fn constant_function(name: &str, value: f64) -> FunctionBuilder {
    let mut code = CodeBuilder::new();
    code.emit(Opcode::PushNumber(value)).emit(Opcode::ReturnValue);
    FunctionBuilder::new(name).code(code.finish().unwrap())
}

/// Interpreter::new() boots with the core globals and nothing loaded
#[test]
fn test_new_contract() {
    let mut vm = vm();
    assert!(vm.loaded_modules().is_empty());
    assert!(vm.global_value("Object").unwrap().is_some());
}

/// load_record() returns the names of the modules it loaded
#[test]
fn test_load_record_contract() {
    let mut vm = vm();
    let mut module = ModuleBuilder::new("first");
    module.global("flag", Some(ConstantValue::Boolean(true)));
    assert_eq!(vm.load_record(module.build()).unwrap(), vec!["first"]);
    assert_eq!(vm.global_value("flag").unwrap(), Some(Value::Boolean(true)));
}

/// Loading the same module twice is rejected
#[test]
fn test_duplicate_module_contract() {
    let mut vm = vm();
    vm.load_record(ModuleBuilder::new("once").build()).unwrap();
    let error = vm.load_record(ModuleBuilder::new("once").build()).unwrap_err();
    assert!(matches!(error, HostError::Load(ModuleError::Invalid(_))));
}

/// load_module() reports modules missing from the search path
#[test]
fn test_load_module_not_found_contract() {
    let dir = tempfile::tempdir().unwrap();
    let mut vm = Interpreter::new(InterpreterConfig {
        search_path: vec![dir.path().to_path_buf()],
        ..InterpreterConfig::default()
    })
    .unwrap();
    let error = vm.load_module("nowhere").unwrap_err();
    assert_eq!(error, HostError::Load(ModuleError::NotFound("nowhere".into())));
}

/// run_function() passes arguments and returns the result
#[test]
fn test_run_function_contract() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    code.emit(Opcode::GetLocal(0))
        .emit(Opcode::GetLocal(1))
        .emit(Opcode::Sub)
        .emit(Opcode::ReturnValue);
    let mut module = ModuleBuilder::new("math");
    module.function(FunctionBuilder::new("minus").args(2).code(code.finish().unwrap()));
    vm.load_record(module.build()).unwrap();
    let result = vm
        .run_function("minus", &[Value::Number(10.0), Value::Number(4.0)])
        .unwrap();
    assert_eq!(result, Value::Number(6.0));
}

/// Argument count mismatches are ArgErrors unless arguments are legacy
#[test]
fn test_argument_count_contract() {
    let mut module = ModuleBuilder::new("m");
    module.function(constant_function("none", 1.0));
    let record = module.build();

    let mut strict = vm();
    strict.load_record(record.clone()).unwrap();
    let error = strict.run_function("none", &[Value::Null]).unwrap_err();
    assert_eq!(error.js_error().unwrap().kind, ErrorKind::ArgError);

    let mut legacy = Interpreter::new(InterpreterConfig {
        legacy_args: true,
        ..InterpreterConfig::default()
    })
    .unwrap();
    legacy.load_record(record).unwrap();
    assert_eq!(
        legacy.run_function("none", &[Value::Null]).unwrap(),
        Value::Number(1.0)
    );
}

/// Uncaught script exceptions become HostError::Uncaught with the error kind
#[test]
fn test_uncaught_error_contract() {
    let mut vm = vm();
    let mut module = ModuleBuilder::new("m");
    let range_error = module.constant("RangeError");
    let message = module.constant("out of range");
    let mut code = CodeBuilder::new();
    code.emit(Opcode::GetName(range_error))
        .emit(Opcode::PushString(message))
        .emit(Opcode::New { argc: 1 })
        .emit(Opcode::Throw);
    module.function(FunctionBuilder::new("fail").code(code.finish().unwrap()));
    vm.load_record(module.build()).unwrap();

    match vm.run_function("fail", &[]) {
        Err(HostError::Uncaught(error)) => {
            assert_eq!(error.kind, ErrorKind::RangeError);
            assert_eq!(error.message, "out of range");
        }
        other => panic!("unexpected {:?}", other),
    }
}

/// The host callback sees every uncaught exception
#[test]
fn test_host_callback_contract() {
    let mut vm = vm();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    vm.set_host_callback(move |event| sink.lock().unwrap().push(event));
    let _ = vm.run_function("undefinedFunction", &[]);
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    match &events[0] {
        HostEvent::UncaughtException { report } => {
            assert!(report.starts_with("ReferenceError"))
        }
        other => panic!("unexpected {:?}", other),
    }
}

/// register_native() makes a host function callable by name
#[test]
fn test_register_native_contract() {
    fn add_one(_vm: &mut Interpreter, _this: &Value, args: &[Value]) -> VmResult<Value> {
        let n = args.first().map(Value::to_number).unwrap_or(f64::NAN);
        Ok(Value::Number(n + 1.0))
    }
    let mut vm = vm();
    vm.register_native("addOne", add_one);
    let mut module = ModuleBuilder::new("m");
    module.function(FunctionBuilder::new("addOne").args(1).native());
    vm.load_record(module.build()).unwrap();
    assert_eq!(
        vm.run_function("addOne", &[Value::Number(1.0)]).unwrap(),
        Value::Number(2.0)
    );
}

/// A cancelled interpreter reports HostError::Cancelled and can run again
#[test]
fn test_cancel_contract() {
    let mut vm = vm();
    let mut code = CodeBuilder::new();
    let top = code.label_here();
    code.jump(top);
    let mut module = ModuleBuilder::new("m");
    module.function(FunctionBuilder::new("spin").code(code.finish().unwrap()));
    module.function(constant_function("after", 5.0));
    vm.load_record(module.build()).unwrap();

    vm.cancel_handle().cancel();
    assert_eq!(vm.run_function("spin", &[]).unwrap_err(), HostError::Cancelled);
    assert_eq!(vm.run_function("after", &[]).unwrap(), Value::Number(5.0));
}

/// clone_of() shares loaded modules but not later changes
#[test]
fn test_clone_contract() {
    let mut master = vm();
    let mut module = ModuleBuilder::new("base");
    module.function(constant_function("seven", 7.0));
    master.load_record(module.build()).unwrap();

    let mut clone = Interpreter::clone_of(&master).unwrap();
    assert_eq!(clone.loaded_modules(), vec!["base"]);
    assert_eq!(clone.run_function("seven", &[]).unwrap(), Value::Number(7.0));

    clone.load_record(ModuleBuilder::new("extra").build()).unwrap();
    assert_eq!(master.loaded_modules(), vec!["base"]);
}
