//! Object model, module loader and bytecode interpreter for the Ejs runtime
//!
//! This crate provides the execution core:
//! - Slot-addressed property stores with names, traits and a hash index
//! - Types with inherited layouts, instance templates and helper vtables
//! - A loader that materializes module records and fixes up forward type
//!   references
//! - A dispatch loop with distinct calling conventions, closures and
//!   exception handlers
//! - Generational collection of interpreter objects
//! - The host embedding interface: loading, initializers, exported
//!   functions, clones, cancellation and host events
//!
//! # Example
//!
//! ```
//! use bytecode_system::{CodeBuilder, FunctionBuilder, ModuleBuilder, Opcode};
//! use core_types::Value;
//! use interpreter::{Interpreter, InterpreterConfig};
//!
//! let mut code = CodeBuilder::new();
//! code.emit(Opcode::GetLocal(0))
//!     .emit(Opcode::PushNumber(2.0))
//!     .emit(Opcode::Mul)
//!     .emit(Opcode::ReturnValue);
//! let mut module = ModuleBuilder::new("demo");
//! module.function(FunctionBuilder::new("double").args(1).code(code.finish().unwrap()));
//!
//! let mut vm = Interpreter::new(InterpreterConfig::default()).unwrap();
//! vm.load_record(module.build()).unwrap();
//! vm.run_initializers().unwrap();
//! let result = vm.run_function("double", &[Value::Number(21.0)]).unwrap();
//! assert_eq!(result, Value::Number(42.0));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod block;
pub mod bootstrap;
pub mod call_frame;
pub mod calls;
pub mod closure;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod exceptions;
pub mod function;
pub mod gc_integration;
pub mod helpers;
pub mod host;
pub mod loader;
pub mod names;
pub mod object;
pub mod operators;
pub mod properties;
pub mod registry;
pub mod scope;
pub mod types;
pub mod vm;

// Re-export main types at crate root
pub use block::{BlockData, FrameId, ScopeLink};
pub use bootstrap::{error_slot, CoreTypes, CORE_GLOBAL_SLOTS};
pub use call_frame::{Completion, Frame};
pub use calls::CallOutcome;
pub use context::{Attention, CancelHandle, HostEvent, InterpreterConfig};
pub use error::{HostError, VmError, VmResult};
pub use function::{FunctionBody, FunctionData, FunctionFlags, NativeFn, ScriptCode};
pub use helpers::{HelperSet, Helpers};
pub use names::{Lookup, Names};
pub use object::{ErrorData, Obj, ObjFlags, ObjKind, PropertyStore, Trait};
pub use operators::Operator;
pub use registry::{ModuleRegistry, MODULE_SUFFIX};
pub use scope::{Binding, ScopeRef};
pub use types::{TypeData, TypeFlags, TypeSpec, TypeState};
pub use vm::{HostCallback, Interpreter};
