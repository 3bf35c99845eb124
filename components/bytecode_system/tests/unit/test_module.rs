//! Tests for module records and builders

use bytecode_system::{
    Attributes, ClassBuilder, CodeBuilder, ConstantValue, FunctionBuilder, ModuleBuilder,
    ModuleError, ModuleRecord, Opcode, Section, TypeRef,
};

fn sample() -> ModuleRecord {
    let mut module = ModuleBuilder::new("sample");
    module.file("sample.es");
    let greeting = module.constant("hello");
    let mut code = CodeBuilder::new();
    code.emit(Opcode::PushString(greeting))
        .emit(Opcode::ReturnValue);
    module.function(
        FunctionBuilder::new("greet")
            .args(1)
            .defaults(1)
            .arg_type(0, TypeRef::Slot(7))
            .code(code.finish().unwrap()),
    );
    module.class(
        ClassBuilder::new("Point")
            .base(TypeRef::named("Object"))
            .attributes(Attributes::DYNAMIC)
            .instance_property("x", Some(ConstantValue::Number(1.0))),
    );
    module.global("count", Some(ConstantValue::Number(0.0)));
    module.build()
}

#[test]
fn test_record_json_round_trip() {
    let record = sample();
    let json = record.to_json().unwrap();
    let back = ModuleRecord::from_json(&json).unwrap();
    assert_eq!(back, record);
}

#[test]
fn test_record_validates() {
    assert!(sample().validate().is_ok());
}

#[test]
fn test_record_with_bad_constant_fails_validation() {
    let mut module = ModuleBuilder::new("bad");
    let mut code = CodeBuilder::new();
    code.emit(Opcode::PushString(5));
    module.function(FunctionBuilder::new("f").code(code.finish().unwrap()));
    assert!(matches!(
        module.build().validate(),
        Err(ModuleError::Invalid(_))
    ));
}

#[test]
fn test_read_and_write_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample.mod.json");
    let mut record = sample();
    record.file = None;
    record.write(&path).unwrap();

    let loaded = ModuleRecord::read(&path).unwrap();
    assert_eq!(loaded.name(), Some("sample"));
    assert_eq!(loaded.file.as_deref(), Some(path.display().to_string().as_str()));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ModuleRecord::read(&dir.path().join("absent.mod.json")).unwrap_err();
    assert!(matches!(err, ModuleError::Io { .. }));
}

#[test]
fn test_native_function_has_no_code() {
    let mut module = ModuleBuilder::new("natives");
    module.function(FunctionBuilder::new("now").native());
    let record = module.build();
    let function = record
        .sections
        .iter()
        .find_map(|s| match s {
            Section::Function(f) => Some(f),
            _ => None,
        })
        .unwrap();
    assert!(function.code.is_none());
    assert!(function.attributes.contains(Attributes::NATIVE));
}
