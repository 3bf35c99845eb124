//! Dispatch loop for bytecode execution
//!
//! [`Interpreter::run`] executes the top frame until the entry frame it was
//! started for returns. Between instructions it polls the attention state;
//! exceptions, collections and host cancellation are all handled at these
//! checkpoints, never in the middle of an instruction.

use crate::calls::CallOutcome;
use crate::context::Attention;
use crate::error::{VmError, VmResult};
use crate::operators::Operator;
use crate::scope::Binding;
use crate::types::internal;
use crate::vm::Interpreter;
use bytecode_system::{BaseIndex, Opcode};
use core_types::{ErrorKind, GcRef, JsError, QualifiedName, Value};
use tracing::{trace, warn};

impl Interpreter {
    /// Runs until the entry frame on top of the frame stack returns.
    ///
    /// Exceptions not handled by any frame of this loop are returned as
    /// [`VmError::Thrown`] after those frames are popped.
    pub fn run(&mut self) -> VmResult<Value> {
        loop {
            if self.attention_needed() {
                match self.checkpoint() {
                    Ok(Some(escaped)) => return Err(VmError::Thrown(escaped)),
                    Ok(None) => {}
                    Err(VmError::Thrown(value)) => {
                        self.raise(value);
                        continue;
                    }
                    Err(error) => {
                        self.unwind_to_entry();
                        return Err(error);
                    }
                }
            }
            match self.step() {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(VmError::Thrown(value)) => self.raise(value),
                Err(error) => {
                    self.unwind_to_entry();
                    return Err(error);
                }
            }
        }
    }

    fn attention_needed(&self) -> bool {
        self.attention != Attention::None
            || self.heap.collection_requested()
            || self.cancel.is_cancelled()
    }

    /// Services the attention state. Returns an exception that escaped the
    /// entry frame.
    fn checkpoint(&mut self) -> VmResult<Option<Value>> {
        if self.cancel.take() {
            self.exception = None;
            self.attention = Attention::None;
            return Err(VmError::Cancelled);
        }
        if self.heap.collection_requested() || self.attention == Attention::GcRequested {
            self.collect_at_checkpoint();
        }
        if self.exception.is_some() {
            self.attention = Attention::None;
            return self.deliver_exception();
        }
        self.attention = Attention::None;
        Ok(None)
    }

    /// Pops every frame of the current dispatch loop, promoting captured
    /// activations on the way.
    fn unwind_to_entry(&mut self) {
        self.exception = None;
        self.attention = Attention::None;
        while let Some(entry) = self.frames.last().map(|frame| frame.entry) {
            if let Err(error) = self.pop_frame() {
                warn!(target: "ejs::vm", %error, "captured activation lost while unwinding");
            }
            if entry {
                break;
            }
        }
    }

    /// Executes one instruction. Returns the result once the entry frame
    /// returns.
    fn step(&mut self) -> VmResult<Option<Value>> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(internal("dispatch loop has no frame"));
        };
        let pc = frame.pc;
        let Some(opcode) = frame.code.chunk.opcode(pc).cloned() else {
            return self.return_from_frame(Value::Undefined);
        };
        frame.pc = pc + 1;
        trace!(target: "ejs::vm", pc, ?opcode, "step");
        self.execute(opcode)
    }

    fn execute(&mut self, opcode: Opcode) -> VmResult<Option<Value>> {
        match opcode {
            Opcode::PushUndefined => self.push(Value::Undefined)?,
            Opcode::PushNull => self.push(Value::Null)?,
            Opcode::PushTrue => self.push(Value::Boolean(true))?,
            Opcode::PushFalse => self.push(Value::Boolean(false))?,
            Opcode::PushNumber(n) => self.push(Value::Number(n))?,
            Opcode::PushString(index) => {
                let text = self.constant(index)?;
                self.push(Value::String(text))?;
            }
            Opcode::PushThis => {
                let this = self.current_this();
                self.push(this)?;
            }
            Opcode::PushGlobal => self.push(Value::Object(self.global))?,

            Opcode::Dup => {
                let top = self.peek()?;
                self.push(top)?;
            }
            Opcode::Pop => {
                self.pop()?;
            }
            Opcode::Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b)?;
                self.push(a)?;
            }

            Opcode::GetLocal(slot) => {
                let value = self.load_local(self.top_index(), slot)?;
                self.push(value)?;
            }
            Opcode::SetLocal(slot) => {
                let value = self.pop()?;
                self.store_local(self.top_index(), slot, value)?;
            }
            Opcode::GetGlobalSlot(slot) => {
                let value = self.get_slot(self.global, slot)?;
                self.push(value)?;
            }
            Opcode::SetGlobalSlot(slot) => {
                let value = self.pop()?;
                self.set_slot(self.global, slot, value)?;
            }
            Opcode::GetLexicalSlot { level, slot } => {
                let value = self.get_lexical_slot(level, slot)?;
                self.push(value)?;
            }
            Opcode::SetLexicalSlot { level, slot } => {
                let value = self.pop()?;
                self.set_lexical_slot(level, slot, value)?;
            }
            Opcode::GetThisSlot(slot) => {
                let this = self.this_object()?;
                let value = self.get_slot(this, slot)?;
                self.push(value)?;
            }
            Opcode::SetThisSlot(slot) => {
                let value = self.pop()?;
                let this = self.this_object()?;
                self.set_slot(this, slot, value)?;
            }
            Opcode::GetObjSlot(slot) => {
                let target = self.pop()?;
                let obj = self.expect_object(&target)?;
                let value = self.get_slot(obj, slot)?;
                self.push(value)?;
            }
            Opcode::SetObjSlot(slot) => {
                let value = self.pop()?;
                let target = self.pop()?;
                let obj = self.expect_object(&target)?;
                self.set_slot(obj, slot, value)?;
            }
            Opcode::GetTypeSlot { base, slot } => {
                let ty = self.this_type(base)?;
                let value = self.get_slot(ty, slot)?;
                self.push(value)?;
            }
            Opcode::SetTypeSlot { base, slot } => {
                let value = self.pop()?;
                let ty = self.this_type(base)?;
                self.set_slot(ty, slot, value)?;
            }

            Opcode::GetName(index) => {
                let name = self.name_constant(index)?;
                let value = self.get_name(&name)?;
                self.push(value)?;
            }
            Opcode::SetName(index) => {
                let name = self.name_constant(index)?;
                let value = self.pop()?;
                self.set_name(&name, value)?;
            }
            Opcode::GetObjName(index) => {
                let name = self.name_constant(index)?;
                let target = self.pop()?;
                let value = self.get_property(&target, &name)?;
                self.push(value)?;
            }
            Opcode::SetObjName(index) => {
                let name = self.name_constant(index)?;
                let value = self.pop()?;
                let target = self.pop()?;
                self.set_property(&target, &name, value)?;
            }
            Opcode::GetIndex => {
                let key = self.pop()?;
                let target = self.pop()?;
                let value = self.get_index(&target, &key)?;
                self.push(value)?;
            }
            Opcode::SetIndex => {
                let value = self.pop()?;
                let key = self.pop()?;
                let target = self.pop()?;
                self.set_index(&target, &key, value)?;
            }
            Opcode::DeleteName(index) => {
                let name = self.name_constant(index)?;
                let deleted = self.delete_name(&name)?;
                self.push(Value::Boolean(deleted))?;
            }
            Opcode::DeleteObjName(index) => {
                let name = self.name_constant(index)?;
                let target = self.pop()?;
                let deleted = self.delete_property(&target, &name)?;
                self.push(Value::Boolean(deleted))?;
            }

            Opcode::Call { argc } => {
                let args = self.pop_args(argc)?;
                let this = self.pop()?;
                let callee = self.pop()?;
                self.call_value(&callee, this, args)?;
            }
            Opcode::CallGlobalSlot { slot, argc } => {
                let args = self.pop_args(argc)?;
                let callee = self.get_slot(self.global, slot)?;
                self.call_value(&callee, Value::Object(self.global), args)?;
            }
            Opcode::CallLocalSlot { slot, argc } => {
                let args = self.pop_args(argc)?;
                let callee = self.load_local(self.top_index(), slot)?;
                self.call_value(&callee, Value::Object(self.global), args)?;
            }
            Opcode::CallLexicalSlot { level, slot, argc } => {
                let args = self.pop_args(argc)?;
                let callee = self.get_lexical_slot(level, slot)?;
                self.call_value(&callee, Value::Object(self.global), args)?;
            }
            Opcode::CallThisSlot { slot, argc } => {
                let args = self.pop_args(argc)?;
                let this = self.this_object()?;
                let callee = self.raw_slot(this, slot)?;
                self.call_value(&callee, Value::Object(this), args)?;
            }
            Opcode::CallObjSlot { slot, argc } => {
                let args = self.pop_args(argc)?;
                let receiver = self.pop()?;
                let obj = self.expect_object(&receiver)?;
                let callee = self.raw_slot(obj, slot)?;
                self.call_value(&callee, receiver, args)?;
            }
            Opcode::CallObjInstanceSlot { base, slot, argc } => {
                let args = self.pop_args(argc)?;
                let receiver = self.pop()?;
                let ty = self.receiver_type(&receiver);
                let ty = self.type_in_chain(ty, base)?;
                let callee = self.raw_slot(ty, slot)?;
                self.call_value(&callee, receiver, args)?;
            }
            Opcode::CallObjStaticSlot { base, slot, argc } => {
                let args = self.pop_args(argc)?;
                let receiver = self.pop()?;
                let ty = self.receiver_type(&receiver);
                let ty = self.type_in_chain(ty, base)?;
                let callee = self.raw_slot(ty, slot)?;
                self.call_value(&callee, Value::Object(ty), args)?;
            }
            Opcode::CallName { name, argc } => {
                let args = self.pop_args(argc)?;
                let name = self.name_constant(name)?;
                let (callee, this) = match self.resolve_name(&name)? {
                    Some(Binding::Named { obj }) => {
                        let receiver = Value::Object(obj);
                        (self.get_property(&receiver, &name)?, receiver)
                    }
                    Some(binding) => (
                        self.read_binding(&binding, &name)?,
                        Value::Object(self.global),
                    ),
                    None => {
                        return self.throw(
                            ErrorKind::ReferenceError,
                            format!("'{}' is not defined", name),
                        )
                    }
                };
                self.call_value(&callee, this, args)?;
            }
            Opcode::CallObjName { name, argc } => {
                let args = self.pop_args(argc)?;
                let name = self.name_constant(name)?;
                let receiver = self.pop()?;
                let callee = self.get_property(&receiver, &name)?;
                if callee.is_nullish() && !receiver.is_nullish() {
                    return self.throw(
                        ErrorKind::TypeError,
                        format!("'{}' is not a function", name),
                    );
                }
                self.call_value(&callee, receiver, args)?;
            }
            Opcode::New { argc } => {
                let args = self.pop_args(argc)?;
                let target = self.pop()?;
                let ty = match target.as_object() {
                    Some(obj) if self.type_data(obj).is_some() => obj,
                    _ => {
                        let shown = self.to_string_value(&target)?;
                        return self.throw(
                            ErrorKind::TypeError,
                            format!("{} is not a type", shown),
                        );
                    }
                };
                let instance = self.construct(ty, &args)?;
                self.push(instance)?;
            }
            Opcode::SuperCall { argc } => {
                let args = self.pop_args(argc)?;
                self.super_call(&args)?;
            }
            Opcode::Return => return self.return_from_frame(Value::Undefined),
            Opcode::ReturnValue => {
                let value = self.pop()?;
                return self.return_from_frame(value);
            }

            Opcode::MakeClosure(slot) => {
                let closure = self.make_closure(slot)?;
                self.push(Value::Object(closure))?;
            }
            Opcode::OpenBlock { slots } => self.open_block(slots)?,
            Opcode::OpenWith => {
                let target = self.pop()?;
                self.open_with(target)?;
            }
            Opcode::CloseBlock => self.close_block()?,

            Opcode::Jump(target) => self.jump(target)?,
            Opcode::JumpIfTrue(target) => {
                if self.pop()?.is_truthy() {
                    self.jump(target)?;
                }
            }
            Opcode::JumpIfFalse(target) => {
                if !self.pop()?.is_truthy() {
                    self.jump(target)?;
                }
            }

            Opcode::Throw => {
                let value = self.pop()?;
                return Err(VmError::Thrown(value));
            }
            Opcode::EndCatch => self.end_catch(),
            Opcode::EnterFinally => self.enter_finally(),
            Opcode::EndFinally => self.end_finally()?,

            Opcode::NewObject => {
                let obj = self.new_object()?;
                self.push(Value::Object(obj))?;
            }
            Opcode::NewArray(count) => {
                let elements = self.pop_args(count)?;
                let array = self.new_array(elements)?;
                self.push(Value::Object(array))?;
            }

            Opcode::Nop => {}

            operator => {
                let Some(op) = Operator::from_opcode(&operator) else {
                    return self.throw(
                        ErrorKind::InstructionError,
                        format!("unhandled opcode {:?}", operator),
                    );
                };
                let result = if op.is_unary() {
                    let value = self.pop()?;
                    self.apply_unary(op, &value)?
                } else {
                    let rhs = self.pop()?;
                    let lhs = self.pop()?;
                    self.apply_binary(op, &lhs, &rhs)?
                };
                self.push(result)?;
            }
        }
        Ok(None)
    }

    /// Leaves the top frame with `value`, cast to the declared return type.
    fn return_from_frame(&mut self, value: Value) -> VmResult<Option<Value>> {
        let Some(function) = self.frames.last().map(|frame| frame.function) else {
            return Err(internal("return without a frame"));
        };
        let return_type = self.obj(function)?.as_function().and_then(|d| d.return_type);
        let value = self.coerce(value, return_type)?;
        let frame = self.pop_frame()?;
        if frame.entry {
            return Ok(Some(value));
        }
        self.push(value)?;
        Ok(None)
    }

    /// Starts a call from bytecode. A native result is pushed at once; a
    /// script result is pushed when its frame returns.
    fn call_value(&mut self, callee: &Value, this: Value, args: Vec<Value>) -> VmResult<()> {
        match self.invoke(callee, this, args, false)? {
            CallOutcome::Pushed => Ok(()),
            CallOutcome::Returned(value) => self.push(value),
        }
    }

    fn jump(&mut self, target: u32) -> VmResult<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Err(internal("jump without a frame"));
        };
        if target as usize > frame.code.chunk.instruction_count() {
            return self.throw(
                ErrorKind::InstructionError,
                format!("jump target {} is out of range", target),
            );
        }
        frame.pc = target as usize;
        Ok(())
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.stack.len() >= self.config.stack_size {
            return Err(VmError::Fatal(JsError::new(
                ErrorKind::ResourceError,
                format!("evaluation stack overflow at {} values", self.config.stack_size),
            )));
        }
        self.stack.push(value);
        Ok(())
    }

    fn stack_base(&self) -> usize {
        self.frames.last().map_or(0, |frame| frame.stack_base)
    }

    fn pop(&mut self) -> VmResult<Value> {
        if self.stack.len() <= self.stack_base() {
            return self.throw(ErrorKind::InstructionError, "evaluation stack underflow");
        }
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => self.throw(ErrorKind::InstructionError, "evaluation stack underflow"),
        }
    }

    fn peek(&mut self) -> VmResult<Value> {
        if self.stack.len() <= self.stack_base() {
            return self.throw(ErrorKind::InstructionError, "evaluation stack underflow");
        }
        Ok(self.stack.last().cloned().unwrap_or_default())
    }

    /// Pops the top `count` values, bottom first.
    fn pop_args(&mut self, count: u32) -> VmResult<Vec<Value>> {
        let count = count as usize;
        if self.stack.len() < self.stack_base() + count {
            return self.throw(ErrorKind::InstructionError, "evaluation stack underflow");
        }
        let at = self.stack.len() - count;
        Ok(self.stack.split_off(at))
    }

    fn top_index(&self) -> usize {
        self.frames.len().saturating_sub(1)
    }

    fn current_this(&self) -> Value {
        self.frames
            .last()
            .map(|frame| frame.this.clone())
            .unwrap_or(Value::Object(self.global))
    }

    fn this_object(&mut self) -> VmResult<GcRef> {
        match self.current_this() {
            Value::Object(obj) => Ok(obj),
            _ => self.throw(ErrorKind::ReferenceError, "'this' is not an object"),
        }
    }

    /// Type `base` steps along the chain of the receiver's type.
    fn this_type(&mut self, base: BaseIndex) -> VmResult<GcRef> {
        let this = self.current_this();
        let ty = self.receiver_type(&this);
        self.type_in_chain(ty, base)
    }

    fn expect_object(&mut self, value: &Value) -> VmResult<GcRef> {
        match value {
            Value::Object(obj) => Ok(*obj),
            Value::Undefined | Value::Null => self.throw(
                ErrorKind::ReferenceError,
                format!("cannot access a slot of {}", value),
            ),
            other => self.throw(
                ErrorKind::TypeError,
                format!("a {} has no slots", other.type_of()),
            ),
        }
    }

    /// Slot value without getter application.
    fn raw_slot(&mut self, obj: GcRef, slot: u32) -> VmResult<Value> {
        let helpers = self.obj(obj)?.helpers.clone();
        helpers.get_property(self, obj, slot)
    }

    fn constant(&mut self, index: u32) -> VmResult<std::sync::Arc<str>> {
        let text = self
            .frames
            .last()
            .and_then(|frame| frame.code.constant(index).cloned());
        match text {
            Some(text) => Ok(text),
            None => self.throw(
                ErrorKind::InstructionError,
                format!("constant {} is out of range", index),
            ),
        }
    }

    fn name_constant(&mut self, index: u32) -> VmResult<QualifiedName> {
        let text = self.constant(index)?;
        Ok(QualifiedName::parse(&text))
    }
}
