//! Bytecode system for the Ejs runtime
//!
//! This crate defines what a loader consumes: the stack-machine
//! instruction set, per-function code chunks with their exception tables,
//! attribute bitmasks, and the ordered section sequence of a module record.
//!
//! # Features
//!
//! - Tagged stack-based instruction set ([`Opcode`])
//! - Code chunks with per-instruction line numbers and handler tables
//! - Module records serialized as JSON through serde
//! - Builders used by producers and tests to assemble records
//!
//! # Example
//!
//! ```
//! use bytecode_system::{CodeBuilder, FunctionBuilder, ModuleBuilder, Opcode};
//!
//! let mut module = ModuleBuilder::new("demo");
//! let mut code = CodeBuilder::new();
//! code.emit(Opcode::PushNumber(42.0)).emit(Opcode::ReturnValue);
//! module.function(FunctionBuilder::new("answer").code(code.finish().unwrap()));
//!
//! let record = module.build();
//! let json = record.to_json().unwrap();
//! let restored = bytecode_system::ModuleRecord::from_json(&json).unwrap();
//! assert_eq!(restored.name(), Some("demo"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod attributes;
pub mod builder;
pub mod chunk;
pub mod exception;
pub mod instruction;
pub mod module;
pub mod opcode;

// Re-export main types at crate root
pub use attributes::Attributes;
pub use builder::{ClassBuilder, CodeBuilder, FunctionBuilder, Label, ModuleBuilder, TryRange};
pub use chunk::BytecodeChunk;
pub use exception::{ExceptionRecord, HandlerKind};
pub use instruction::Instruction;
pub use module::{
    BlockRecord, ClassRecord, ConstantValue, FunctionRecord, ModuleError, ModuleRecord,
    PropertyRecord, Section, TypeRef,
};
pub use opcode::{BaseIndex, Opcode};
