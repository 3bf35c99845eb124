//! Name resolution along the scope chain.
//!
//! From the innermost scope outwards a name is looked up in:
//!
//! 1. the lexical blocks the running frame has open (a `with` block
//!    resolves against its target object),
//! 2. the running frame's activation,
//! 3. the receiver (`this`) and its type's members,
//! 4. the scopes the running function closed over, whether promoted heap
//!    blocks or activations of frames that have not returned yet,
//! 5. the global object.
//!
//! Lexical slot instructions count the same scopes, minus the receiver:
//! level 0 is the innermost, and the level one past the last scope is the
//! global object.

use crate::block::{FrameId, ScopeLink};
use crate::error::VmResult;
use crate::object::ObjKind;
use crate::vm::Interpreter;
use core_types::{ErrorKind, GcRef, QualifiedName, Value};
use smallvec::SmallVec;

/// One scope on the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeRef {
    /// A heap block
    Block(GcRef),
    /// The activation of the frame at this index of the frame stack
    Activation(usize),
    /// The running frame's receiver
    This,
    /// The global object
    Global,
}

/// Where a name was found.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// An activation slot of a live frame
    Activation {
        /// Frame index
        frame: usize,
        /// Slot
        slot: u32,
    },
    /// A slot of a heap object
    Slot {
        /// Holder
        obj: GcRef,
        /// Slot
        slot: u32,
    },
    /// A property reached through an object's property protocol
    Named {
        /// Holder
        obj: GcRef,
    },
}

type Chain = SmallVec<[ScopeRef; 8]>;

impl Interpreter {
    pub(crate) fn frame_index(&self, id: FrameId) -> Option<usize> {
        let index = id.depth as usize;
        self.frames
            .get(index)
            .filter(|frame| frame.id == id)
            .map(|_| index)
    }

    /// Scopes in lookup order, innermost first, ending with the global
    /// object.
    pub fn scope_chain(&self, include_this: bool) -> Chain {
        let mut chain = Chain::new();
        if let Some(top) = self.frames.len().checked_sub(1) {
            let frame = &self.frames[top];
            chain.extend(frame.blocks.iter().rev().map(|&b| ScopeRef::Block(b)));
            chain.push(ScopeRef::Activation(top));
            if include_this && matches!(frame.this, Value::Object(_)) {
                chain.push(ScopeRef::This);
            }
            let mut link = frame.scope;
            let mut steps = 0usize;
            while steps < 4096 {
                steps += 1;
                link = match link {
                    ScopeLink::None => break,
                    ScopeLink::Heap(block) => {
                        chain.push(ScopeRef::Block(block));
                        match self.heap.get(block).and_then(|cell| cell.block_data()) {
                            Some(data) => data.scope,
                            None => break,
                        }
                    }
                    ScopeLink::Frame(id) => match self.frame_index(id) {
                        Some(index) => {
                            chain.push(ScopeRef::Activation(index));
                            self.frames[index].scope
                        }
                        None => break,
                    },
                };
            }
        }
        chain.push(ScopeRef::Global);
        chain
    }

    /// Finds the binding `name` resolves to.
    pub fn resolve_name(&mut self, name: &QualifiedName) -> VmResult<Option<Binding>> {
        for scope in self.scope_chain(true) {
            let found = match scope {
                ScopeRef::Block(block) => {
                    let target = self.obj(block)?.block_data().and_then(|d| d.with_target);
                    match target {
                        Some(target) if self.has_property(target, name)? => {
                            Some(Binding::Named { obj: target })
                        }
                        _ => self
                            .lookup_own(block, name)?
                            .map(|slot| Binding::Slot { obj: block, slot }),
                    }
                }
                ScopeRef::Activation(frame) => {
                    let function = self.frames[frame].function;
                    let locals = self.frames[frame].locals.len();
                    self.lookup_own(function, name)?
                        .filter(|&slot| (slot as usize) < locals)
                        .map(|slot| Binding::Activation { frame, slot })
                }
                ScopeRef::This => {
                    let this = self.frames.last().and_then(|f| f.this.as_object());
                    match this {
                        Some(obj) if self.has_property(obj, name)? => Some(Binding::Named { obj }),
                        _ => None,
                    }
                }
                ScopeRef::Global => {
                    let global = self.global;
                    self.lookup_own(global, name)?
                        .map(|slot| Binding::Slot { obj: global, slot })
                }
            };
            if found.is_some() {
                return Ok(found);
            }
        }
        Ok(None)
    }

    /// True if `obj` has `name` itself or through its type chain. For a
    /// type, inherited statics count.
    pub fn has_property(&mut self, obj: GcRef, name: &QualifiedName) -> VmResult<bool> {
        let cell = self.obj(obj)?;
        if matches!(cell.kind, ObjKind::Type(_)) {
            return Ok(self.find_in_type_chain(obj, name)?.is_some());
        }
        let helpers = cell.helpers.clone();
        let ty = cell.ty;
        if helpers.get_property_by_name(self, obj, name)?.is_some() {
            return Ok(true);
        }
        Ok(self.find_in_type_chain(ty, name)?.is_some())
    }

    /// Value bound to `name`.
    pub fn get_name(&mut self, name: &QualifiedName) -> VmResult<Value> {
        match self.resolve_name(name)? {
            Some(binding) => self.read_binding(&binding, name),
            None => self.throw(
                ErrorKind::ReferenceError,
                format!("'{}' is not defined", name),
            ),
        }
    }

    /// Assigns `name` where it is bound, or defines it on the global object.
    pub fn set_name(&mut self, name: &QualifiedName, value: Value) -> VmResult<()> {
        match self.resolve_name(name)? {
            Some(Binding::Activation { frame, slot }) => self.store_local(frame, slot, value),
            Some(Binding::Slot { obj, slot }) => self.set_slot(obj, slot, value),
            Some(Binding::Named { obj }) => self.set_property(&Value::Object(obj), name, value),
            None => {
                let global = Value::Object(self.global);
                self.set_property(&global, name, value)
            }
        }
    }

    /// Deletes the binding of `name`. Activation slots and slots of sealed
    /// objects are not deletable.
    pub fn delete_name(&mut self, name: &QualifiedName) -> VmResult<bool> {
        match self.resolve_name(name)? {
            None | Some(Binding::Activation { .. }) => Ok(false),
            Some(Binding::Slot { obj, slot }) => {
                let cell = self.obj(obj)?;
                if !cell.is_dynamic() {
                    return Ok(false);
                }
                let helpers = cell.helpers.clone();
                helpers.delete_property(self, obj, slot)
            }
            Some(Binding::Named { obj }) => self.delete_property(&Value::Object(obj), name),
        }
    }

    pub(crate) fn read_binding(
        &mut self,
        binding: &Binding,
        name: &QualifiedName,
    ) -> VmResult<Value> {
        match *binding {
            Binding::Activation { frame, slot } => self.load_local(frame, slot),
            Binding::Slot { obj, slot } => self.get_slot(obj, slot),
            Binding::Named { obj } => self.get_property(&Value::Object(obj), name),
        }
    }

    pub(crate) fn load_local(&mut self, frame: usize, slot: u32) -> VmResult<Value> {
        let value = self
            .frames
            .get(frame)
            .and_then(|f| f.locals.get(slot as usize))
            .cloned();
        match value {
            Some(value) => Ok(value),
            None => self.throw(
                ErrorKind::ReferenceError,
                format!("activation slot {} is out of bounds", slot),
            ),
        }
    }

    /// Stores into an activation slot, casting to the slot's declared type.
    pub(crate) fn store_local(&mut self, frame: usize, slot: u32, value: Value) -> VmResult<()> {
        let Some(function) = self.frames.get(frame).map(|f| f.function) else {
            return Err(crate::types::internal("no such frame"));
        };
        let declared = self
            .obj(function)?
            .props
            .trait_at(slot)
            .and_then(|t| t.declared_type);
        let value = self.coerce(value, declared)?;
        match self
            .frames
            .get_mut(frame)
            .and_then(|f| f.locals.get_mut(slot as usize))
        {
            Some(local) => {
                *local = value;
                Ok(())
            }
            None => self.throw(
                ErrorKind::ReferenceError,
                format!("activation slot {} is out of bounds", slot),
            ),
        }
    }

    fn lexical_scope(&mut self, level: u32) -> VmResult<ScopeRef> {
        let chain = self.scope_chain(false);
        match chain.get(level as usize) {
            Some(&scope) => Ok(scope),
            None => self.throw(
                ErrorKind::ReferenceError,
                format!("no enclosing scope at level {}", level),
            ),
        }
    }

    /// Reads `slot` of the scope `level` steps out.
    pub fn get_lexical_slot(&mut self, level: u32, slot: u32) -> VmResult<Value> {
        match self.lexical_scope(level)? {
            ScopeRef::Activation(frame) => self.load_local(frame, slot),
            ScopeRef::Block(block) => self.get_slot(block, slot),
            _ => {
                let global = self.global;
                self.get_slot(global, slot)
            }
        }
    }

    /// Writes `slot` of the scope `level` steps out.
    pub fn set_lexical_slot(&mut self, level: u32, slot: u32, value: Value) -> VmResult<()> {
        match self.lexical_scope(level)? {
            ScopeRef::Activation(frame) => self.store_local(frame, slot, value),
            ScopeRef::Block(block) => self.set_slot(block, slot, value),
            _ => {
                let global = self.global;
                self.set_slot(global, slot, value)
            }
        }
    }
}
