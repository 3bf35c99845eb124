//! Bytecode opcodes for the stack-based interpreter.
//!
//! Operands are inline. Slot operands index property tables, `name`
//! operands index the module's constant pool (a qualified name written as
//! `"space::name"` or a bare name), and jump targets are absolute
//! instruction indices within the same chunk.
//!
//! Stack layouts below list operands bottom to top.

use serde::{Deserialize, Serialize};

/// Selects a type in the inheritance chain of a receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BaseIndex {
    /// Counted from the receiver's own type: 0 is the type itself, 1 its base
    FromType(u32),
    /// Counted from the root of the chain: 0 is `Object`
    FromRoot(u32),
}

/// Bytecode opcodes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Opcode {
    // Constants
    /// Push undefined
    PushUndefined,
    /// Push null
    PushNull,
    /// Push true
    PushTrue,
    /// Push false
    PushFalse,
    /// Push a number
    PushNumber(f64),
    /// Push a string from the constant pool
    PushString(u32),
    /// Push the current `this`
    PushThis,
    /// Push the global object
    PushGlobal,

    // Stack
    /// Duplicate the top value
    Dup,
    /// Discard the top value
    Pop,
    /// Exchange the two top values
    Swap,

    // Slot access
    /// Push activation slot
    GetLocal(u32),
    /// `[value]` store into activation slot
    SetLocal(u32),
    /// Push global slot
    GetGlobalSlot(u32),
    /// `[value]` store into global slot
    SetGlobalSlot(u32),
    /// Push a slot from the scope `level` steps out (0 is innermost)
    GetLexicalSlot {
        /// Scope depth
        level: u32,
        /// Slot in that scope
        slot: u32,
    },
    /// `[value]` store into a slot of an enclosing scope
    SetLexicalSlot {
        /// Scope depth
        level: u32,
        /// Slot in that scope
        slot: u32,
    },
    /// Push a slot of `this`
    GetThisSlot(u32),
    /// `[value]` store into a slot of `this`
    SetThisSlot(u32),
    /// `[obj]` push a slot of `obj`
    GetObjSlot(u32),
    /// `[obj, value]` store into a slot of `obj`
    SetObjSlot(u32),
    /// Push a static slot of a type in the chain of `this`
    GetTypeSlot {
        /// Which type in the chain
        base: BaseIndex,
        /// Slot in that type
        slot: u32,
    },
    /// `[value]` store into a static slot of a type in the chain of `this`
    SetTypeSlot {
        /// Which type in the chain
        base: BaseIndex,
        /// Slot in that type
        slot: u32,
    },

    // Name access
    /// Push the value bound to a name, searching the scope chain
    GetName(u32),
    /// `[value]` assign to a name found on the scope chain
    SetName(u32),
    /// `[obj]` push a named property of `obj`
    GetObjName(u32),
    /// `[obj, value]` assign a named property of `obj`
    SetObjName(u32),
    /// `[obj, key]` push `obj[key]`
    GetIndex,
    /// `[obj, key, value]` assign `obj[key]`
    SetIndex,
    /// Delete a name from the scope chain; push whether it existed
    DeleteName(u32),
    /// `[obj]` delete a named property; push whether it existed
    DeleteObjName(u32),

    // Calls
    /// `[callee, this, args...]` call a function value
    Call {
        /// Actual argument count
        argc: u32,
    },
    /// `[args...]` call a function stored in a global slot
    CallGlobalSlot {
        /// Global slot
        slot: u32,
        /// Actual argument count
        argc: u32,
    },
    /// `[args...]` call a function stored in an activation slot
    CallLocalSlot {
        /// Activation slot
        slot: u32,
        /// Actual argument count
        argc: u32,
    },
    /// `[args...]` call a function stored in an enclosing scope
    CallLexicalSlot {
        /// Scope depth
        level: u32,
        /// Slot in that scope
        slot: u32,
        /// Actual argument count
        argc: u32,
    },
    /// `[args...]` call a method stored in a slot of `this`
    CallThisSlot {
        /// Slot of `this`
        slot: u32,
        /// Actual argument count
        argc: u32,
    },
    /// `[obj, args...]` call a function stored in an own slot of `obj`
    CallObjSlot {
        /// Slot of `obj`
        slot: u32,
        /// Actual argument count
        argc: u32,
    },
    /// `[obj, args...]` call an instance method from a type's slot table
    CallObjInstanceSlot {
        /// Which type in the receiver's chain
        base: BaseIndex,
        /// Method slot
        slot: u32,
        /// Actual argument count
        argc: u32,
    },
    /// `[obj, args...]` call a static method of a type in the receiver's chain
    CallObjStaticSlot {
        /// Which type in the receiver's chain
        base: BaseIndex,
        /// Method slot
        slot: u32,
        /// Actual argument count
        argc: u32,
    },
    /// `[args...]` call a function found by name on the scope chain
    CallName {
        /// Constant pool index of the name
        name: u32,
        /// Actual argument count
        argc: u32,
    },
    /// `[obj, args...]` call a method found by name on `obj`
    CallObjName {
        /// Constant pool index of the name
        name: u32,
        /// Actual argument count
        argc: u32,
    },
    /// `[type, args...]` construct an instance
    New {
        /// Actual argument count
        argc: u32,
    },
    /// `[args...]` run the base type's constructor on `this`
    SuperCall {
        /// Actual argument count
        argc: u32,
    },
    /// Return undefined
    Return,
    /// `[value]` return value
    ReturnValue,

    // Closures and blocks
    /// Instantiate the nested function template held in an activation slot
    /// of the running function's template, capturing the current scope
    MakeClosure(u32),
    /// Push a fresh lexical block with the given number of slots
    OpenBlock {
        /// Slot count
        slots: u32,
    },
    /// `[obj]` push a block that resolves names against `obj`
    OpenWith,
    /// Pop the innermost lexical block
    CloseBlock,

    // Control
    /// Jump to an absolute instruction index
    Jump(u32),
    /// `[cond]` jump if truthy
    JumpIfTrue(u32),
    /// `[cond]` jump if falsy
    JumpIfFalse(u32),

    // Exceptions
    /// `[value]` throw
    Throw,
    /// Leave a catch handler, closing its catch block
    EndCatch,
    /// Enter a finally block on the normal path
    EnterFinally,
    /// Leave a finally block, resuming any exception it masked
    EndFinally,

    // Construction
    /// Push a new empty dynamic object
    NewObject,
    /// `[elements...]` push a new array holding the top `n` values
    NewArray(u32),

    // Operators
    /// `[a, b]` a + b
    Add,
    /// `[a, b]` a - b
    Sub,
    /// `[a, b]` a * b
    Mul,
    /// `[a, b]` a / b
    Div,
    /// `[a, b]` a % b
    Rem,
    /// `[a]` -a
    Neg,
    /// `[a, b]` a & b
    BitAnd,
    /// `[a, b]` a | b
    BitOr,
    /// `[a, b]` a ^ b
    BitXor,
    /// `[a, b]` a << b
    Shl,
    /// `[a, b]` a >> b
    Shr,
    /// `[a, b]` a >>> b
    UShr,
    /// `[a]` ~a
    BitNot,
    /// `[a]` !a
    Not,
    /// `[a, b]` a == b
    Eq,
    /// `[a, b]` a != b
    Ne,
    /// `[a, b]` a === b
    StrictEq,
    /// `[a, b]` a !== b
    StrictNe,
    /// `[a, b]` a < b
    Lt,
    /// `[a, b]` a <= b
    Le,
    /// `[a, b]` a > b
    Gt,
    /// `[a, b]` a >= b
    Ge,
    /// `[a]` typeof a
    TypeOf,
    /// `[value, type]` value is an instance of type
    InstanceOf,
    /// `[value, type]` cast value to type
    Cast,
    /// `[value, type]` value structurally resembles type
    Like,

    /// Do nothing
    Nop,
}

impl Opcode {
    /// Jump target carried by this instruction, if any.
    pub fn jump_target(&self) -> Option<u32> {
        match self {
            Opcode::Jump(t) | Opcode::JumpIfTrue(t) | Opcode::JumpIfFalse(t) => Some(*t),
            _ => None,
        }
    }

    /// Constant pool index carried by this instruction, if any.
    pub fn constant_index(&self) -> Option<u32> {
        match self {
            Opcode::PushString(i)
            | Opcode::GetName(i)
            | Opcode::SetName(i)
            | Opcode::GetObjName(i)
            | Opcode::SetObjName(i)
            | Opcode::DeleteName(i)
            | Opcode::DeleteObjName(i)
            | Opcode::CallName { name: i, .. }
            | Opcode::CallObjName { name: i, .. } => Some(*i),
            _ => None,
        }
    }

    pub(crate) fn set_jump_target(&mut self, target: u32) {
        if let Opcode::Jump(t) | Opcode::JumpIfTrue(t) | Opcode::JumpIfFalse(t) = self {
            *t = target;
        }
    }
}
