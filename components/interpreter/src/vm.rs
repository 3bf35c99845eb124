//! The interpreter instance.
//!
//! An [`Interpreter`] owns one heap, one evaluation stack and one frame
//! stack. Everything the dispatch loop, the loader and native code do goes
//! through it; there is no global state.

use crate::block::BlockData;
use crate::bootstrap::CoreTypes;
use crate::call_frame::Frame;
use crate::context::{Attention, CancelHandle, HostEvent, InterpreterConfig};
use crate::error::{VmError, VmResult};
use crate::function::{FunctionData, NativeFn};
use crate::helpers::{HelperSet, Helpers};
use crate::loader::{Fixup, Initializer};
use crate::names::Lookup;
use crate::object::{Obj, ObjFlags, ObjKind, PropertyStore, Trait};
use crate::registry::ModuleRegistry;
use crate::types::{internal, TypeFlags};
use core_types::{ErrorKind, GcRef, JsError, QualifiedName, Value};
use memory_manager::{GcError, Generation, Heap};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// Host callback receiving [`HostEvent`]s.
pub type HostCallback = Box<dyn FnMut(HostEvent) + Send>;

/// A script callback queued for [`Interpreter::service_events`].
#[derive(Debug, Clone)]
pub(crate) struct PendingEvent {
    pub(crate) callback: Value,
    pub(crate) args: Vec<Value>,
}

/// An Ejs interpreter.
///
/// Single-threaded: one interpreter runs on one thread at a time. Several
/// interpreters may run in parallel when each was made with
/// [`Interpreter::clone_of`].
pub struct Interpreter {
    pub(crate) heap: Heap<Obj>,
    pub(crate) config: InterpreterConfig,
    pub(crate) helpers: HelperSet,
    pub(crate) core: CoreTypes,
    pub(crate) global: GcRef,
    pub(crate) stack: Vec<Value>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) frame_serial: u64,
    pub(crate) native_depth: usize,
    pub(crate) temp_roots: Vec<Value>,
    pub(crate) exception: Option<Value>,
    pub(crate) attention: Attention,
    pub(crate) cancel: CancelHandle,
    pub(crate) registry: ModuleRegistry,
    pub(crate) loaded: FxHashSet<String>,
    pub(crate) loading: Vec<String>,
    pub(crate) fixups: Vec<Fixup>,
    pub(crate) pending_types: Vec<GcRef>,
    pub(crate) initializers: VecDeque<Initializer>,
    pub(crate) natives: FxHashMap<String, NativeFn>,
    pub(crate) host_callback: Option<HostCallback>,
    pub(crate) events: VecDeque<PendingEvent>,
    pub(crate) memory_error: GcRef,
    pub(crate) handling_memory_error: bool,
    pub(crate) low_memory_reported: bool,
}

impl fmt::Debug for Interpreter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interpreter")
            .field("heap", &self.heap)
            .field("frames", &self.frames.len())
            .field("stack", &self.stack.len())
            .field("modules", &self.loaded.len())
            .field("attention", &self.attention)
            .finish()
    }
}

impl Interpreter {
    /// The managed heap.
    pub fn heap(&self) -> &Heap<Obj> {
        &self.heap
    }

    /// The managed heap, mutably. Stores made through it must be followed
    /// by a write barrier.
    pub fn heap_mut(&mut self) -> &mut Heap<Obj> {
        &mut self.heap
    }

    /// Handles of the core types.
    pub fn core(&self) -> CoreTypes {
        self.core
    }

    /// Helper vtables of the core types.
    pub fn helper_set(&self) -> &HelperSet {
        &self.helpers
    }

    /// The global object.
    pub fn global(&self) -> GcRef {
        self.global
    }

    /// Configuration the interpreter was created with.
    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Borrows a live object.
    pub fn obj(&self, r: GcRef) -> VmResult<&Obj> {
        self.heap.get(r).ok_or_else(|| internal("stale object reference"))
    }

    /// Mutably borrows a live object.
    pub fn obj_mut(&mut self, r: GcRef) -> VmResult<&mut Obj> {
        self.heap
            .get_mut(r)
            .ok_or_else(|| internal("stale object reference"))
    }

    /// Builds a core error instance of `kind` and returns it as a thrown
    /// exception.
    pub fn throw<T>(&mut self, kind: ErrorKind, message: impl Into<String>) -> VmResult<T> {
        Err(self.make_error(kind, message))
    }

    /// Like [`Interpreter::throw`], but returns the error instead of a
    /// result.
    pub fn make_error(&mut self, kind: ErrorKind, message: impl Into<String>) -> VmError {
        let message = message.into();
        match self.new_error_value(kind, &message) {
            Ok(value) => VmError::Thrown(value),
            Err(error) => error,
        }
    }

    /// Allocates an error instance without throwing it.
    pub fn new_error_value(&mut self, kind: ErrorKind, message: &str) -> VmResult<Value> {
        let ty = self.core.errors[kind.index()];
        let helpers = self.type_helpers(ty)?;
        let error = helpers.create(self, ty)?;
        self.set_named(error, "message", Value::string(message))?;
        Ok(Value::Object(error))
    }

    /// Exception for an allocation refused by a degraded heap.
    ///
    /// The first one throws the permanent `MemoryError`. One raised while
    /// running frames are still handling that is logged and reported as
    /// fatal.
    pub(crate) fn out_of_memory(&mut self) -> VmError {
        if self.handling_memory_error && !self.frames.is_empty() {
            error!(
                target: "ejs::vm",
                "memory error raised while handling a memory error"
            );
            return VmError::Fatal(JsError::new(
                ErrorKind::MemoryError,
                "out of memory while handling an out-of-memory error",
            ));
        }
        self.handling_memory_error = true;
        VmError::Thrown(Value::Object(self.memory_error))
    }

    /// Allocates a cell in the new generation.
    pub fn allocate(&mut self, cell: Obj) -> VmResult<GcRef> {
        match self.heap.allocate(cell) {
            Ok(r) => Ok(r),
            Err(GcError::Degraded) => Err(self.out_of_memory()),
            Err(other) => Err(other.into()),
        }
    }

    /// Allocates a function object with `slots` activation slots.
    pub fn allocate_function(
        &mut self,
        data: FunctionData,
        slots: usize,
        generation: Generation,
    ) -> VmResult<GcRef> {
        let mut cell = Obj::block(
            self.core.function,
            self.helpers.function.clone(),
            slots,
            BlockData::default(),
        );
        cell.flags = ObjFlags::empty();
        cell.kind = ObjKind::Function(Box::new(data));
        if generation == Generation::NEW {
            self.allocate(cell)
        } else {
            Ok(self.heap.allocate_in(generation, cell)?)
        }
    }

    /// Helpers the instances of `ty` use.
    pub(crate) fn type_helpers(&self, ty: GcRef) -> VmResult<Arc<dyn Helpers>> {
        self.type_data(ty)
            .map(|data| data.instance_helpers.clone())
            .ok_or_else(|| internal("not a type"))
    }

    /// Allocates an instance of `ty` laid out from its instance block.
    ///
    /// The new object shares the template's tables until its first write.
    pub fn create_instance(&mut self, ty: GcRef, kind: ObjKind) -> VmResult<GcRef> {
        let data = self.type_data(ty).ok_or_else(|| internal("not a type"))?;
        let helpers = data.instance_helpers.clone();
        let dynamic = data.flags.contains(TypeFlags::DYNAMIC_INSTANCE);
        let template = data.instance_block;
        let props = match template {
            Some(block) => self.obj(block)?.props.clone(),
            None => PropertyStore::new(),
        };
        let mut cell = Obj::new(ty, helpers);
        cell.props = props;
        cell.kind = kind;
        if dynamic {
            cell.flags |= ObjFlags::DYNAMIC;
        }
        self.allocate(cell)
    }

    /// A new dynamic object of type `Object`.
    pub fn new_object(&mut self) -> VmResult<GcRef> {
        let object = self.core.object;
        self.create_instance(object, ObjKind::Object)
    }

    /// A new core array holding `elements`.
    pub fn new_array(&mut self, elements: Vec<Value>) -> VmResult<GcRef> {
        let array = self.core.array;
        self.create_instance(array, ObjKind::Array(elements))
    }

    /// Stores into an existing or new slot and runs the write barrier.
    pub fn store_slot(&mut self, obj: GcRef, slot: u32, value: Value) -> VmResult<()> {
        let cell = self.obj_mut(obj)?;
        cell.props.set(Some(slot), value.clone());
        self.heap.write_barrier(obj, &value);
        Ok(())
    }

    /// Defines slot, name, trait and value together. `None` appends.
    pub fn define_slot(
        &mut self,
        obj: GcRef,
        slot: Option<u32>,
        name: QualifiedName,
        attributes: Trait,
        value: Value,
    ) -> VmResult<u32> {
        let cell = self.obj_mut(obj)?;
        let slot = cell.props.define(slot, name, attributes, value.clone());
        self.heap.write_barrier(obj, &value);
        if let Some(ty) = attributes.declared_type {
            self.heap.note_edge(obj, ty);
        }
        Ok(slot)
    }

    /// Slot of `name` in the object's own store.
    ///
    /// An exact match wins. A public name is then tried in the object's
    /// open namespaces, innermost first, and finally matched against every
    /// namespace; more than one match there is a reference error.
    pub fn lookup_own(&mut self, obj: GcRef, name: &QualifiedName) -> VmResult<Option<u32>> {
        let cell = self.obj(obj)?;
        if let Some(slot) = cell.props.lookup(name) {
            return Ok(Some(slot));
        }
        if !name.is_public() {
            return Ok(None);
        }
        if let Some(block) = cell.block_data() {
            for space in block.namespaces.iter().rev() {
                let qualified = QualifiedName::new(&**space, &*name.name);
                if let Some(slot) = cell.props.lookup(&qualified) {
                    return Ok(Some(slot));
                }
            }
        }
        match cell.props.lookup_unqualified(&name.name) {
            Lookup::Found(slot) => Ok(Some(slot)),
            Lookup::NotFound => Ok(None),
            Lookup::Ambiguous => self.throw(
                ErrorKind::ReferenceError,
                format!("ambiguous reference to '{}'", name.name),
            ),
        }
    }

    /// Copies `obj`. Deep copies also copy the objects its slots and
    /// elements refer to, except types and functions; shared subgraphs and
    /// cycles are copied once.
    pub fn clone_cell(&mut self, obj: GcRef, deep: bool) -> VmResult<GcRef> {
        let mut copies = FxHashMap::default();
        self.clone_into(obj, deep, &mut copies)
    }

    fn clone_into(
        &mut self,
        obj: GcRef,
        deep: bool,
        copies: &mut FxHashMap<GcRef, GcRef>,
    ) -> VmResult<GcRef> {
        if let Some(&copy) = copies.get(&obj) {
            return Ok(copy);
        }
        let cell = self.obj(obj)?.clone();
        let copy = self.allocate(cell)?;
        copies.insert(obj, copy);
        if !deep {
            return Ok(copy);
        }

        let values = self.obj(copy)?.props.values().to_vec();
        for (slot, value) in values.iter().enumerate() {
            if let Some(target) = self.deep_clone_target(value) {
                let cloned = self.clone_into(target, true, copies)?;
                self.store_slot(copy, slot as u32, Value::Object(cloned))?;
            }
        }
        let elements = self.obj(copy)?.as_array().cloned().unwrap_or_default();
        for (index, value) in elements.iter().enumerate() {
            if let Some(target) = self.deep_clone_target(value) {
                let cloned = Value::Object(self.clone_into(target, true, copies)?);
                if let Some(elements) = self.obj_mut(copy)?.as_array_mut() {
                    elements[index] = cloned.clone();
                }
                self.heap.write_barrier(copy, &cloned);
            }
        }
        Ok(copy)
    }

    fn deep_clone_target(&self, value: &Value) -> Option<GcRef> {
        let target = value.as_object()?;
        match &self.heap.get(target)?.kind {
            ObjKind::Type(_) | ObjKind::Function(_) => None,
            _ => Some(target),
        }
    }

    /// Core type describing `value`: its object's type, or the primitive
    /// type.
    pub fn type_of_value(&self, value: &Value) -> GcRef {
        match value {
            Value::Undefined => self.core.void,
            Value::Null => self.core.null,
            Value::Boolean(_) => self.core.boolean,
            Value::Number(_) => self.core.number,
            Value::String(_) => self.core.string,
            Value::Object(r) => self.heap.get(*r).map_or(self.core.object, |cell| cell.ty),
        }
    }

    /// True if `value` is an instance of `ty` or one of its subtypes.
    pub fn instance_of(&self, value: &Value, ty: GcRef) -> bool {
        self.is_subtype_of(self.type_of_value(value), ty)
    }

    /// The `typeof` string: functions and types report `"function"`.
    pub fn typeof_str(&self, value: &Value) -> &'static str {
        if let Value::Object(r) = value {
            if let Some(cell) = self.heap.get(*r) {
                if matches!(cell.kind, ObjKind::Function(_) | ObjKind::Type(_)) {
                    return "function";
                }
            }
        }
        value.type_of()
    }

    /// True if `function` is a getter.
    pub(crate) fn is_getter(&self, function: GcRef) -> bool {
        self.heap
            .get(function)
            .and_then(Obj::as_function)
            .is_some_and(FunctionData::is_getter)
    }

    /// Keeps `value` alive across a call that may collect.
    pub fn root(&mut self, value: Value) {
        self.temp_roots.push(value);
    }

    /// Drops the temporary roots pushed after `mark`.
    pub fn unroot_to(&mut self, mark: usize) {
        self.temp_roots.truncate(mark);
    }

    /// Current number of temporary roots, for [`Interpreter::unroot_to`].
    pub fn root_mark(&self) -> usize {
        self.temp_roots.len()
    }

    pub(crate) fn notify(&mut self, event: HostEvent) {
        if let Some(callback) = self.host_callback.as_mut() {
            callback(event);
        }
    }
}
