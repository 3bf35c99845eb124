//! End-to-end runs of the command line host
//!
//! Module records are written to temporary search directories and run
//! through `Cli` and `Runtime` the way `corten-ejs` runs them.

use bytecode_system::{CodeBuilder, FunctionBuilder, ModuleBuilder, Opcode};
use clap::Parser;
use core_types::Value;
use js_cli::{Cli, CliError, Runtime};
use std::path::Path;
use tempfile::TempDir;

fn returning(module: &str, function: &str, text: &str) -> ModuleBuilder {
    let mut builder = ModuleBuilder::new(module);
    let constant = builder.constant(text);
    let mut code = CodeBuilder::new();
    code.emit(Opcode::PushString(constant)).emit(Opcode::ReturnValue);
    builder.function(FunctionBuilder::new(function).code(code.finish().unwrap()));
    builder
}

fn write(dir: &Path, module: ModuleBuilder, file: &str) {
    module.build().write(&dir.join(file)).unwrap();
}

fn execute(args: &[&str]) -> Result<Option<Value>, CliError> {
    let mut argv = vec!["corten-ejs"];
    argv.extend_from_slice(args);
    let cli = Cli::try_parse_from(argv).unwrap();
    let mut runtime = Runtime::from_cli(&cli)?;
    runtime.execute(&cli)
}

#[test]
fn first_search_directory_wins() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();
    write(first.path(), returning("greet", "hello", "first"), "greet.mod.json");
    write(second.path(), returning("greet", "hello", "second"), "greet.mod.json");

    let result = execute(&[
        "-s",
        first.path().to_str().unwrap(),
        "-s",
        second.path().to_str().unwrap(),
        "--run",
        "hello",
        "greet",
    ])
    .unwrap();
    assert_eq!(result, Some(Value::from("first")));
}

#[test]
fn trailing_arguments_keep_their_kinds() {
    let dir = TempDir::new().unwrap();
    let mut module = ModuleBuilder::new("kinds");
    let mut code = CodeBuilder::new();
    code.emit(Opcode::GetLocal(0))
        .emit(Opcode::TypeOf)
        .emit(Opcode::ReturnValue);
    module.function(FunctionBuilder::new("kind").args(1).code(code.finish().unwrap()));
    write(dir.path(), module, "kinds.mod.json");
    let search = dir.path().to_str().unwrap();

    for (arg, expected) in [("true", "boolean"), ("12.5", "number"), ("abc", "string")] {
        let result = execute(&["-s", search, "-r", "kind", "kinds", "--", arg]).unwrap();
        assert_eq!(result, Some(Value::from(expected)), "{}", arg);
    }
}

#[test]
fn uncaught_script_error_exits_with_one() {
    let dir = TempDir::new().unwrap();
    let mut module = ModuleBuilder::new("strict");
    let range_error = module.constant("RangeError");
    let mut code = CodeBuilder::new();
    code.emit(Opcode::GetName(range_error))
        .emit(Opcode::GetLocal(0))
        .emit(Opcode::New { argc: 1 })
        .emit(Opcode::Throw);
    module.function(FunctionBuilder::new("reject").args(1).code(code.finish().unwrap()));
    write(dir.path(), module, "strict.mod.json");

    let error = execute(&[
        "-s",
        dir.path().to_str().unwrap(),
        "-r",
        "reject",
        "strict",
        "--",
        "too large",
    ])
    .unwrap_err();
    assert_eq!(error.exit_code(), 1);
    assert!(error.to_string().starts_with("RangeError: too large"));
}

#[test]
fn loading_without_run_returns_nothing() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), returning("quiet", "noop", "unused"), "quiet.mod.json");
    let result = execute(&["-s", dir.path().to_str().unwrap(), "quiet"]).unwrap();
    assert_eq!(result, None);
}

#[test]
fn missing_module_exits_with_two() {
    let dir = TempDir::new().unwrap();
    let error = execute(&["-s", dir.path().to_str().unwrap(), "absent"]).unwrap_err();
    assert_eq!(error.exit_code(), 2);
}
