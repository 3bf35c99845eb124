//! Function templates and closures.
//!
//! A function is a block whose slots describe its activation: parameters
//! first, then locals, with nested function templates stored in the slots
//! they are declared at. Script and native functions share this shape and
//! differ only in [`FunctionBody`].

use crate::error::VmResult;
use crate::vm::Interpreter;
use bitflags::bitflags;
use bytecode_system::{Attributes, BytecodeChunk};
use core_types::{GcRef, QualifiedName, Value};
use std::fmt;
use std::sync::Arc;

/// Signature of a host-supplied function: interpreter, receiver, arguments.
pub type NativeFn = fn(&mut Interpreter, &Value, &[Value]) -> VmResult<Value>;

bitflags! {
    /// Calling-convention flags of a function.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct FunctionFlags: u16 {
        /// Reading the slot holding the function calls it
        const GETTER = 1 << 0;
        /// Writing the paired getter's slot calls this function
        const SETTER = 1 << 1;
        /// Constructor of its owner type
        const CONSTRUCTOR = 1 << 2;
        /// Extra arguments are collected into an array
        const REST_ARGS = 1 << 3;
        /// Missing arguments are padded, extras dropped
        const LEGACY_ARGS = 1 << 4;
        /// Static member of its owner
        const STATIC = 1 << 5;
        /// Body supplied by the host
        const NATIVE = 1 << 6;
        /// Module or type initializer
        const INITIALIZER = 1 << 7;
        /// Constructor chains to its base explicitly
        const CALLS_SUPER = 1 << 8;
    }
}

impl FunctionFlags {
    /// Flags implied by declaration attributes.
    pub fn from_attributes(attributes: Attributes) -> Self {
        let pairs = [
            (Attributes::GETTER, FunctionFlags::GETTER),
            (Attributes::SETTER, FunctionFlags::SETTER),
            (Attributes::CONSTRUCTOR, FunctionFlags::CONSTRUCTOR),
            (Attributes::REST_ARGS, FunctionFlags::REST_ARGS),
            (Attributes::LEGACY_ARGS, FunctionFlags::LEGACY_ARGS),
            (Attributes::STATIC, FunctionFlags::STATIC),
            (Attributes::NATIVE, FunctionFlags::NATIVE),
            (Attributes::INITIALIZER, FunctionFlags::INITIALIZER),
            (Attributes::CALLS_SUPER, FunctionFlags::CALLS_SUPER),
        ];
        pairs
            .iter()
            .filter(|(attribute, _)| attributes.contains(*attribute))
            .fold(FunctionFlags::empty(), |flags, (_, flag)| flags | *flag)
    }
}

/// Compiled code of a script function with the module data it refers to.
#[derive(Debug, Clone)]
pub struct ScriptCode {
    /// Instructions and exception table
    pub chunk: BytecodeChunk,
    /// Constant pool of the defining module
    pub constants: Arc<[Arc<str>]>,
    /// Module file, for backtraces
    pub file: Option<Arc<str>>,
}

impl ScriptCode {
    /// String constant `index`.
    pub fn constant(&self, index: u32) -> Option<&Arc<str>> {
        self.constants.get(index as usize)
    }
}

/// Body of a function.
#[derive(Clone)]
pub enum FunctionBody {
    /// Declared native whose implementation has not been bound yet
    Declared,
    /// Host function
    Native(NativeFn),
    /// Bytecode
    Script(Arc<ScriptCode>),
}

impl fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FunctionBody::Declared => f.write_str("Declared"),
            FunctionBody::Native(_) => f.write_str("Native"),
            FunctionBody::Script(code) => f
                .debug_struct("Script")
                .field("instructions", &code.chunk.instruction_count())
                .field("handlers", &code.chunk.handlers.len())
                .finish(),
        }
    }
}

/// Payload of a function object.
#[derive(Debug, Clone)]
pub struct FunctionData {
    /// Function name
    pub name: QualifiedName,
    /// Code
    pub body: FunctionBody,
    /// Declared parameters, not counting a rest parameter
    pub num_args: u32,
    /// Trailing parameters with defaults
    pub num_default: u32,
    /// Locals after the parameters
    pub num_locals: u32,
    /// Declared parameter types
    pub arg_types: Vec<Option<GcRef>>,
    /// Declared return type
    pub return_type: Option<GcRef>,
    /// Catch types, parallel to the chunk's handler table
    pub catch_types: Vec<Option<GcRef>>,
    /// Calling-convention flags
    pub flags: FunctionFlags,
    /// Type the function is a member of
    pub owner: Option<GcRef>,
    /// Slot in the owner or enclosing container
    pub slot: Option<u32>,
    /// `this` captured when the closure was made
    pub bound_this: Option<Value>,
    /// Setter paired with this getter
    pub setter: Option<GcRef>,
    /// The template this closure was made from
    pub template: Option<GcRef>,
}

impl FunctionData {
    /// A function with no parameters and the given body.
    pub fn new(name: QualifiedName, body: FunctionBody) -> Self {
        FunctionData {
            name,
            body,
            num_args: 0,
            num_default: 0,
            num_locals: 0,
            arg_types: Vec::new(),
            return_type: None,
            catch_types: Vec::new(),
            flags: FunctionFlags::empty(),
            owner: None,
            slot: None,
            bound_this: None,
            setter: None,
            template: None,
        }
    }

    /// Activation slots the function needs: parameters, rest array, locals.
    pub fn activation_size(&self) -> usize {
        let rest = usize::from(self.flags.contains(FunctionFlags::REST_ARGS));
        (self.num_args + self.num_locals) as usize + rest
    }

    /// Arguments a caller must supply.
    pub fn min_args(&self) -> u32 {
        self.num_args.saturating_sub(self.num_default)
    }

    /// True for script functions.
    pub fn is_script(&self) -> bool {
        matches!(self.body, FunctionBody::Script(_))
    }

    /// Script code, if any.
    pub fn script(&self) -> Option<&Arc<ScriptCode>> {
        match &self.body {
            FunctionBody::Script(code) => Some(code),
            _ => None,
        }
    }

    /// True for getters.
    pub fn is_getter(&self) -> bool {
        self.flags.contains(FunctionFlags::GETTER)
    }

    /// True for constructors.
    pub fn is_constructor(&self) -> bool {
        self.flags.contains(FunctionFlags::CONSTRUCTOR)
    }
}
