//! Integration test suite for the Ejs runtime
//!
//! This crate holds cross-component scenarios: collection of interpreter
//! objects, property stores, inheritance, exception propagation, closures,
//! clones and the CLI host.

/// Re-export components for test convenience
pub mod components {
    pub use bytecode_system;
    pub use core_types;
    pub use interpreter;
    pub use js_cli;
    pub use memory_manager;
}

/// Helpers shared by the scenario tests
pub mod support {
    use bytecode_system::{CodeBuilder, Opcode};
    use interpreter::{Interpreter, InterpreterConfig};

    /// An interpreter with the default configuration.
    pub fn interpreter() -> Interpreter {
        match Interpreter::new(InterpreterConfig::default()) {
            Ok(vm) => vm,
            Err(error) => panic!("interpreter failed to boot: {}", error),
        }
    }

    /// Appends code performing `trace = trace * 10 + digit`, where `trace`
    /// is the constant index of the global's name.
    pub fn record_step(code: &mut CodeBuilder, trace: u32, digit: f64) {
        code.emit(Opcode::GetName(trace))
            .emit(Opcode::PushNumber(10.0))
            .emit(Opcode::Mul)
            .emit(Opcode::PushNumber(digit))
            .emit(Opcode::Add)
            .emit(Opcode::SetName(trace));
    }
}
