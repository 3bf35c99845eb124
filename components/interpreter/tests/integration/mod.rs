//! Integration tests for the interpreter
//!
//! Modules are assembled with the bytecode builders, loaded, and driven
//! through the host API: classes and inheritance, closures, exception
//! handlers across frames, static initializers and collection.

use bytecode_system::{
    Attributes, ClassBuilder, CodeBuilder, ConstantValue, FunctionBuilder, ModuleBuilder, Opcode,
    TryRange, TypeRef,
};
use core_types::{ErrorKind, Value};
use interpreter::{HostError, Interpreter, InterpreterConfig};
use memory_manager::GcMode;

fn vm() -> Interpreter {
    Interpreter::new(InterpreterConfig::default()).unwrap()
}

fn object(vm: &mut Interpreter, name: &str) -> Value {
    vm.global_value(name).unwrap().unwrap()
}

/// Appends `trace = trace * 10 + n`.
fn step(code: &mut CodeBuilder, trace: u32, n: f64) {
    code.emit(Opcode::GetName(trace))
        .emit(Opcode::PushNumber(10.0))
        .emit(Opcode::Mul)
        .emit(Opcode::PushNumber(n))
        .emit(Opcode::Add)
        .emit(Opcode::SetName(trace));
}

fn point_module() -> ModuleBuilder {
    let mut module = ModuleBuilder::new("geometry");
    let point = module.constant("Point");
    let sum = module.constant("sum");

    let mut ctor = CodeBuilder::new();
    ctor.emit(Opcode::GetLocal(0))
        .emit(Opcode::SetThisSlot(0))
        .emit(Opcode::GetLocal(1))
        .emit(Opcode::SetThisSlot(1))
        .emit(Opcode::Return);
    let mut sum_code = CodeBuilder::new();
    sum_code
        .emit(Opcode::GetThisSlot(0))
        .emit(Opcode::GetThisSlot(1))
        .emit(Opcode::Add)
        .emit(Opcode::ReturnValue);
    module.class(
        ClassBuilder::new("Point")
            .instance_property("x", Some(ConstantValue::Number(0.0)))
            .instance_property("y", Some(ConstantValue::Number(0.0)))
            .constructor(FunctionBuilder::new("Point").args(2).code(ctor.finish().unwrap()))
            .method(FunctionBuilder::new("sum").code(sum_code.finish().unwrap())),
    );

    let mut main = CodeBuilder::new();
    main.emit(Opcode::GetName(point))
        .emit(Opcode::PushNumber(3.0))
        .emit(Opcode::PushNumber(4.0))
        .emit(Opcode::New { argc: 2 })
        .emit(Opcode::CallObjName { name: sum, argc: 0 })
        .emit(Opcode::ReturnValue);
    module.function(FunctionBuilder::new("main").code(main.finish().unwrap()));
    module
}

// ============================================================================
// Classes
// ============================================================================

#[test]
fn test_script_constructs_and_calls_method() {
    let mut vm = vm();
    vm.load_record(point_module().build()).unwrap();
    vm.run_initializers().unwrap();
    assert_eq!(vm.run_function("main", &[]).unwrap(), Value::Number(7.0));
}

#[test]
fn test_host_constructs_instances() {
    let mut vm = vm();
    vm.load_record(point_module().build()).unwrap();
    let point = object(&mut vm, "Point").as_object().unwrap();

    let a = vm
        .construct(point, &[Value::Number(1.0), Value::Number(2.0)])
        .unwrap();
    let b = vm
        .construct(point, &[Value::Number(10.0), Value::Number(20.0)])
        .unwrap();
    assert_eq!(vm.call_method(&a, "sum", &[]).unwrap(), Value::Number(3.0));
    assert_eq!(vm.call_method(&b, "sum", &[]).unwrap(), Value::Number(30.0));
    assert_eq!(
        vm.get_named(a.as_object().unwrap(), "y").unwrap(),
        Value::Number(2.0)
    );
    assert!(vm.instance_of(&a, point));
}

#[test]
fn test_constructor_arguments_are_checked() {
    let mut vm = vm();
    vm.load_record(point_module().build()).unwrap();
    let point = object(&mut vm, "Point").as_object().unwrap();
    let error = vm.construct(point, &[Value::Number(1.0)]).unwrap_err();
    assert_eq!(vm.to_js_error(&error).kind, ErrorKind::ArgError);
}

fn animals_module() -> ModuleBuilder {
    let mut module = ModuleBuilder::new("animals");
    let animal_text = module.constant("animal");
    let bird_text = module.constant("bird");

    let mut animal_ctor = CodeBuilder::new();
    animal_ctor
        .emit(Opcode::PushNumber(4.0))
        .emit(Opcode::SetThisSlot(0))
        .emit(Opcode::Return);
    let mut animal_describe = CodeBuilder::new();
    animal_describe
        .emit(Opcode::PushString(animal_text))
        .emit(Opcode::ReturnValue);
    let mut leg_count = CodeBuilder::new();
    leg_count
        .emit(Opcode::GetThisSlot(0))
        .emit(Opcode::ReturnValue);

    let mut bird_ctor = CodeBuilder::new();
    bird_ctor
        .emit(Opcode::PushNumber(2.0))
        .emit(Opcode::SetThisSlot(0))
        .emit(Opcode::PushNumber(2.0))
        .emit(Opcode::SetThisSlot(1))
        .emit(Opcode::Return);
    let mut bird_describe = CodeBuilder::new();
    bird_describe
        .emit(Opcode::PushString(bird_text))
        .emit(Opcode::ReturnValue);

    // Declared before its base to exercise the forward reference.
    module.class(
        ClassBuilder::new("Bird")
            .base(TypeRef::named("Animal"))
            .instance_property("wings", Some(ConstantValue::Number(0.0)))
            .constructor(FunctionBuilder::new("Bird").code(bird_ctor.finish().unwrap()))
            .method(
                FunctionBuilder::new("describe")
                    .attributes(Attributes::OVERRIDE)
                    .code(bird_describe.finish().unwrap()),
            ),
    );
    module.class(
        ClassBuilder::new("Animal")
            .instance_property("legs", Some(ConstantValue::Number(0.0)))
            .constructor(FunctionBuilder::new("Animal").code(animal_ctor.finish().unwrap()))
            .method(FunctionBuilder::new("describe").code(animal_describe.finish().unwrap()))
            .method(FunctionBuilder::new("legCount").code(leg_count.finish().unwrap())),
    );
    module
}

#[test]
fn test_derived_type_overrides_and_inherits() {
    let mut vm = vm();
    vm.load_record(animals_module().build()).unwrap();
    vm.run_initializers().unwrap();
    let animal = object(&mut vm, "Animal").as_object().unwrap();
    let bird = object(&mut vm, "Bird").as_object().unwrap();

    let generic = vm.construct(animal, &[]).unwrap();
    let robin = vm.construct(bird, &[]).unwrap();
    assert_eq!(
        vm.call_method(&generic, "describe", &[]).unwrap(),
        Value::from("animal")
    );
    assert_eq!(
        vm.call_method(&robin, "describe", &[]).unwrap(),
        Value::from("bird")
    );
    assert_eq!(
        vm.call_method(&generic, "legCount", &[]).unwrap(),
        Value::Number(4.0)
    );
    assert_eq!(
        vm.call_method(&robin, "legCount", &[]).unwrap(),
        Value::Number(2.0)
    );
    let robin_obj = robin.as_object().unwrap();
    assert_eq!(vm.get_named(robin_obj, "wings").unwrap(), Value::Number(2.0));
    assert!(vm.instance_of(&robin, animal));
    assert!(!vm.instance_of(&generic, bird));
}

#[test]
fn test_static_initializer_runs_before_use() {
    let mut vm = vm();
    let mut module = ModuleBuilder::new("settings");
    let level = module.constant("level");
    let mut init = CodeBuilder::new();
    init.emit(Opcode::PushThis)
        .emit(Opcode::PushNumber(3.0))
        .emit(Opcode::SetObjName(level))
        .emit(Opcode::Return);
    module.class(
        ClassBuilder::new("Config")
            .static_property("level", None)
            .initializer(FunctionBuilder::new("Config$init").code(init.finish().unwrap())),
    );
    vm.load_record(module.build()).unwrap();
    let config = object(&mut vm, "Config").as_object().unwrap();
    assert_eq!(vm.get_named(config, "level").unwrap(), Value::Undefined);

    vm.run_initializers().unwrap();
    assert_eq!(vm.get_named(config, "level").unwrap(), Value::Number(3.0));
}

// ============================================================================
// Closures
// ============================================================================

#[test]
fn test_counter_closure_keeps_its_state() {
    let mut vm = vm();
    let mut inner = CodeBuilder::new();
    inner
        .emit(Opcode::GetLexicalSlot { level: 1, slot: 0 })
        .emit(Opcode::PushNumber(1.0))
        .emit(Opcode::Add)
        .emit(Opcode::Dup)
        .emit(Opcode::SetLexicalSlot { level: 1, slot: 0 })
        .emit(Opcode::ReturnValue);
    let mut outer = CodeBuilder::new();
    outer
        .emit(Opcode::PushNumber(0.0))
        .emit(Opcode::SetLocal(0))
        .emit(Opcode::MakeClosure(1))
        .emit(Opcode::ReturnValue);

    let mut module = ModuleBuilder::new("counters");
    module.function(
        FunctionBuilder::new("makeCounter")
            .locals(2)
            .local(0, "count")
            .nested(1, FunctionBuilder::new("next").code(inner.finish().unwrap()))
            .code(outer.finish().unwrap()),
    );
    vm.load_record(module.build()).unwrap();

    let first = vm.run_function("makeCounter", &[]).unwrap();
    let second = vm.run_function("makeCounter", &[]).unwrap();
    let call = |vm: &mut Interpreter, f: &Value| vm.call_function(f, Value::Undefined, &[]).unwrap();
    assert_eq!(call(&mut vm, &first), Value::Number(1.0));
    assert_eq!(call(&mut vm, &first), Value::Number(2.0));
    assert_eq!(call(&mut vm, &second), Value::Number(1.0));

    vm.root(first.clone());
    vm.collect_garbage(GcMode::Full);
    assert_eq!(call(&mut vm, &first), Value::Number(3.0));
}

// ============================================================================
// Exceptions
// ============================================================================

fn divide_module() -> ModuleBuilder {
    let mut module = ModuleBuilder::new("divide");
    let range_error = module.constant("RangeError");
    let type_error = module.constant("TypeError");
    let message = module.constant("division by zero");
    let checked = module.constant("checkedDivide");

    // checkedDivide(a, b): throws RangeError for b == 0, TypeError for b < 0
    let mut divide = CodeBuilder::new();
    let negative = divide.label();
    let zero = divide.label();
    divide
        .emit(Opcode::GetLocal(1))
        .emit(Opcode::PushNumber(0.0))
        .emit(Opcode::StrictEq)
        .jump_if_true(zero)
        .emit(Opcode::GetLocal(1))
        .emit(Opcode::PushNumber(0.0))
        .emit(Opcode::Lt)
        .jump_if_true(negative)
        .emit(Opcode::GetLocal(0))
        .emit(Opcode::GetLocal(1))
        .emit(Opcode::Div)
        .emit(Opcode::ReturnValue);
    divide.bind(zero);
    divide
        .emit(Opcode::GetName(range_error))
        .emit(Opcode::PushString(message))
        .emit(Opcode::New { argc: 1 })
        .emit(Opcode::Throw);
    divide.bind(negative);
    divide
        .emit(Opcode::GetName(type_error))
        .emit(Opcode::PushString(message))
        .emit(Opcode::New { argc: 1 })
        .emit(Opcode::Throw);
    module.function(
        FunctionBuilder::new("checkedDivide")
            .args(2)
            .code(divide.finish().unwrap()),
    );

    // safeDivide(a, b): checkedDivide(a, b), or -1 when it throws RangeError
    let mut safe = CodeBuilder::new();
    let try_start = safe.label_here();
    safe.emit(Opcode::GetLocal(0))
        .emit(Opcode::GetLocal(1))
        .emit(Opcode::CallName {
            name: checked,
            argc: 2,
        })
        .emit(Opcode::ReturnValue);
    let try_end = safe.label_here();
    let handler_start = safe.label_here();
    safe.emit(Opcode::PushNumber(-1.0)).emit(Opcode::ReturnValue);
    let handler_end = safe.label_here();
    safe.try_catch(
        TryRange {
            try_start,
            try_end,
            handler_start,
            handler_end,
            block_depth: 0,
        },
        Some(TypeRef::named("RangeError")),
    );
    module.function(FunctionBuilder::new("safeDivide").args(2).code(safe.finish().unwrap()));
    module
}

#[test]
fn test_typed_catch_takes_matching_errors() {
    let mut vm = vm();
    vm.load_record(divide_module().build()).unwrap();
    let args = |a: f64, b: f64| [Value::Number(a), Value::Number(b)];
    assert_eq!(
        vm.run_function("safeDivide", &args(9.0, 3.0)).unwrap(),
        Value::Number(3.0)
    );
    assert_eq!(
        vm.run_function("safeDivide", &args(9.0, 0.0)).unwrap(),
        Value::Number(-1.0)
    );
}

#[test]
fn test_typed_catch_passes_other_errors_on() {
    let mut vm = vm();
    vm.load_record(divide_module().build()).unwrap();
    let error = vm
        .run_function("safeDivide", &[Value::Number(1.0), Value::Number(-1.0)])
        .unwrap_err();
    match error {
        HostError::Uncaught(error) => {
            assert_eq!(error.kind, ErrorKind::TypeError);
            assert_eq!(error.message, "division by zero");
            let report = error.backtrace_report();
            assert!(report.contains("checkedDivide"));
            assert!(report.contains("safeDivide"));
        }
        other => panic!("unexpected {:?}", other),
    }
}

fn finally_module() -> ModuleBuilder {
    let mut module = ModuleBuilder::new("ordering");
    let trace = module.constant("trace");
    let guarded = module.constant("guarded");
    module.global("trace", Some(ConstantValue::Number(0.0)));

    // normal(): try { step 1 } finally { step 2 } step 3
    let mut normal = CodeBuilder::new();
    let try_start = normal.label_here();
    step(&mut normal, trace, 1.0);
    let try_end = normal.label_here();
    normal.emit(Opcode::EnterFinally);
    let handler_start = normal.label_here();
    step(&mut normal, trace, 2.0);
    normal.emit(Opcode::EndFinally);
    let handler_end = normal.label_here();
    step(&mut normal, trace, 3.0);
    normal.emit(Opcode::Return);
    normal.try_finally(TryRange {
        try_start,
        try_end,
        handler_start,
        handler_end,
        block_depth: 0,
    });
    module.function(FunctionBuilder::new("normal").code(normal.finish().unwrap()));

    // guarded(): try { step 1; throw 0 } finally { step 2 } step 3
    let mut code = CodeBuilder::new();
    let try_start = code.label_here();
    step(&mut code, trace, 1.0);
    code.emit(Opcode::PushNumber(0.0)).emit(Opcode::Throw);
    let try_end = code.label_here();
    let handler_start = code.label_here();
    step(&mut code, trace, 2.0);
    code.emit(Opcode::EndFinally);
    let handler_end = code.label_here();
    step(&mut code, trace, 3.0);
    code.emit(Opcode::Return);
    code.try_finally(TryRange {
        try_start,
        try_end,
        handler_start,
        handler_end,
        block_depth: 0,
    });
    module.function(FunctionBuilder::new("guarded").code(code.finish().unwrap()));

    // outer(): try { guarded() } catch { step 9 }
    let mut outer = CodeBuilder::new();
    let try_start = outer.label_here();
    outer
        .emit(Opcode::CallName {
            name: guarded,
            argc: 0,
        })
        .emit(Opcode::Pop)
        .emit(Opcode::Return);
    let try_end = outer.label_here();
    let handler_start = outer.label_here();
    step(&mut outer, trace, 9.0);
    outer.emit(Opcode::EndCatch).emit(Opcode::Return);
    let handler_end = outer.label_here();
    outer.try_catch(
        TryRange {
            try_start,
            try_end,
            handler_start,
            handler_end,
            block_depth: 0,
        },
        None,
    );
    module.function(FunctionBuilder::new("outer").code(outer.finish().unwrap()));
    module
}

#[test]
fn test_finally_on_the_normal_path() {
    let mut vm = vm();
    vm.load_record(finally_module().build()).unwrap();
    vm.run_function("normal", &[]).unwrap();
    assert_eq!(vm.global_value("trace").unwrap(), Some(Value::Number(123.0)));
}

#[test]
fn test_finally_runs_before_the_outer_catch() {
    let mut vm = vm();
    vm.load_record(finally_module().build()).unwrap();
    vm.run_function("outer", &[]).unwrap();
    assert_eq!(vm.global_value("trace").unwrap(), Some(Value::Number(129.0)));
}

#[test]
fn test_interpreter_is_usable_after_an_uncaught_exception() {
    let mut vm = vm();
    vm.load_record(finally_module().build()).unwrap();
    assert!(vm.run_function("guarded", &[]).is_err());
    vm.set_global("trace", Value::Number(0.0)).unwrap();
    vm.run_function("normal", &[]).unwrap();
    assert_eq!(vm.global_value("trace").unwrap(), Some(Value::Number(123.0)));
}

// ============================================================================
// Modules on the search path
// ============================================================================

#[test]
fn test_dependent_modules_load_from_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut lib = ModuleBuilder::new("zoo.base");
    lib.class(ClassBuilder::new("Creature"));
    lib.build()
        .write(&dir.path().join("zoo.base.mod.json"))
        .unwrap();
    let mut app = ModuleBuilder::new("zoo.app");
    app.depends_on("zoo.base");
    app.class(ClassBuilder::new("Cat").base(TypeRef::named("Creature")));
    app.build()
        .write(&dir.path().join("zoo.app.mod.json"))
        .unwrap();

    let mut vm = Interpreter::new(InterpreterConfig {
        search_path: vec![dir.path().to_path_buf()],
        ..InterpreterConfig::default()
    })
    .unwrap();
    vm.load_module("zoo.app").unwrap();
    vm.run_initializers().unwrap();

    let creature = object(&mut vm, "Creature").as_object().unwrap();
    let cat = object(&mut vm, "Cat").as_object().unwrap();
    let tom = vm.construct(cat, &[]).unwrap();
    assert!(vm.instance_of(&tom, creature));
    assert_eq!(vm.loaded_modules(), vec!["zoo.app", "zoo.base"]);
}
