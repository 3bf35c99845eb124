//! Closures and lexical blocks.
//!
//! A closure is a copy of a function template whose scope link names the
//! scope it was made in. While that scope is a live frame the link is a
//! [`ScopeLink::Frame`]; when the frame returns, its activation is copied
//! into a heap block and every object linked to the frame is re-linked to
//! the copy.

use crate::block::{BlockData, FrameId, ScopeLink};
use crate::call_frame::Frame;
use crate::error::VmResult;
use crate::object::{Obj, ObjKind};
use crate::types::internal;
use crate::vm::Interpreter;
use core_types::{ErrorKind, GcRef, Value};

impl Interpreter {
    fn register_capture(&mut self, id: FrameId, obj: GcRef) {
        if let Some(index) = self.frame_index(id) {
            self.frames[index].needs_closure.push(obj);
        }
    }

    /// Pushes `block` on the running frame's block stack.
    pub(crate) fn enter_block(&mut self, block: GcRef, scope: ScopeLink) {
        if let ScopeLink::Frame(id) = scope {
            self.register_capture(id, block);
        }
        if let Some(frame) = self.frames.last_mut() {
            frame.blocks.push(block);
        }
    }

    /// `OpenBlock`: a fresh block with `slots` undefined slots.
    pub(crate) fn open_block(&mut self, slots: u32) -> VmResult<()> {
        let Some(scope) = self.frames.last().map(Frame::innermost_scope) else {
            return Err(internal("block opened outside a frame"));
        };
        let cell = Obj::block(
            self.core.block,
            self.helpers.object.clone(),
            slots as usize,
            BlockData::new(scope),
        );
        let block = self.allocate(cell)?;
        self.enter_block(block, scope);
        Ok(())
    }

    /// `OpenWith`: a block resolving names against `target` first.
    pub(crate) fn open_with(&mut self, target: Value) -> VmResult<()> {
        let target = match target {
            Value::Object(obj) => obj,
            Value::Undefined | Value::Null => {
                return self.throw(ErrorKind::ReferenceError, "with target is null or undefined")
            }
            _ => return self.throw(ErrorKind::TypeError, "with target must be an object"),
        };
        let Some(scope) = self.frames.last().map(Frame::innermost_scope) else {
            return Err(internal("block opened outside a frame"));
        };
        let mut data = BlockData::new(scope);
        data.with_target = Some(target);
        let cell = Obj::block(self.core.block, self.helpers.object.clone(), 0, data);
        let block = self.allocate(cell)?;
        self.enter_block(block, scope);
        Ok(())
    }

    /// `CloseBlock`.
    pub(crate) fn close_block(&mut self) -> VmResult<()> {
        match self.frames.last_mut().and_then(|frame| frame.blocks.pop()) {
            Some(_) => Ok(()),
            None => self.throw(ErrorKind::InstructionError, "no open block to close"),
        }
    }

    /// `MakeClosure`: instantiates the template in activation slot `slot`
    /// of the running function's template.
    pub(crate) fn make_closure(&mut self, slot: u32) -> VmResult<GcRef> {
        let Some((function, scope, this)) = self
            .frames
            .last()
            .map(|frame| (frame.function, frame.innermost_scope(), frame.this.clone()))
        else {
            return Err(internal("closure made outside a frame"));
        };
        let template = self
            .obj(function)?
            .props
            .get(slot)
            .and_then(Value::as_object)
            .filter(|&t| self.heap.get(t).and_then(Obj::as_function).is_some());
        let Some(template) = template else {
            return self.throw(
                ErrorKind::InstructionError,
                format!("slot {} holds no function template", slot),
            );
        };

        let mut cell = self.obj(template)?.clone();
        if let ObjKind::Function(data) = &mut cell.kind {
            data.template = Some(template);
            if !this.is_nullish() {
                data.bound_this = Some(this);
            }
        }
        match cell.block_data_mut() {
            Some(block) => block.scope = scope,
            None => cell.block = Some(Box::new(BlockData::new(scope))),
        }
        let closure = self.allocate(cell)?;
        if let Some(id) = self.enclosing_frame(scope) {
            self.register_capture(id, closure);
        }
        Ok(closure)
    }

    /// The live frame `scope` leads to through heap blocks, if any.
    fn enclosing_frame(&self, mut scope: ScopeLink) -> Option<FrameId> {
        loop {
            match scope {
                ScopeLink::Frame(id) => return Some(id),
                ScopeLink::Heap(block) => scope = self.heap.get(block)?.block_data()?.scope,
                ScopeLink::None => return None,
            }
        }
    }

    /// Pops the top frame and discards its part of the evaluation stack.
    ///
    /// If a closure captured the frame, directly or through one of its
    /// blocks, its activation moves to a heap block first.
    pub(crate) fn pop_frame(&mut self) -> VmResult<Frame> {
        let Some(frame) = self.frames.pop() else {
            return Err(internal("frame stack underflow"));
        };
        self.stack.truncate(frame.stack_base);
        let captured = frame.needs_closure.iter().any(|&obj| {
            self.heap
                .get(obj)
                .is_some_and(|cell| matches!(cell.kind, ObjKind::Function(_)))
        });
        if captured {
            self.promote_activation(&frame)?;
        }
        Ok(frame)
    }

    fn promote_activation(&mut self, frame: &Frame) -> VmResult<()> {
        let layout = self.obj(frame.function)?.props.clone();
        let mut cell = Obj::block(
            self.core.block,
            self.helpers.object.clone(),
            0,
            BlockData::new(frame.scope),
        );
        cell.props = layout;
        for (slot, value) in frame.locals.iter().enumerate() {
            cell.props.set(Some(slot as u32), value.clone());
        }
        let activation = self.allocate(cell)?;
        self.heap.write_barrier_all(activation);

        let link = ScopeLink::Heap(activation);
        for &obj in &frame.needs_closure {
            if let Some(block) = self.heap.get_mut(obj).and_then(Obj::block_data_mut) {
                if block.scope == ScopeLink::Frame(frame.id) {
                    block.scope = link;
                }
            }
            self.heap.note_edge(obj, activation);
        }
        if let ScopeLink::Frame(outer) = frame.scope {
            self.register_capture(outer, activation);
        }
        Ok(())
    }
}
