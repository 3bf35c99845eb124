//! Interpreter boot: core types, the global object and core natives.
//!
//! Core types are bound to fixed global slots so module records can refer
//! to them with `TypeRef::Slot` before anything else is loaded.

use crate::block::BlockData;
use crate::context::{Attention, CancelHandle, InterpreterConfig};
use crate::error::{HostError, VmError, VmResult};
use crate::function::{FunctionBody, FunctionData, FunctionFlags, NativeFn};
use crate::helpers::{HelperSet, Helpers};
use crate::object::{Obj, ObjKind, Trait};
use crate::registry::ModuleRegistry;
use crate::types::{internal, TypeData, TypeFlags, TypeSpec, TypeState};
use crate::vm::Interpreter;
use bytecode_system::Attributes;
use core_types::{ErrorKind, GcRef, QualifiedName, Value};
use memory_manager::{Generation, Heap};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

/// Global slot of `Object`.
pub const OBJECT_SLOT: u32 = 0;
/// Global slot of `Type`.
pub const TYPE_SLOT: u32 = 1;
/// Global slot of `Block`.
pub const BLOCK_SLOT: u32 = 2;
/// Global slot of `Function`.
pub const FUNCTION_SLOT: u32 = 3;
/// Global slot of `Array`.
pub const ARRAY_SLOT: u32 = 4;
/// Global slot of `Boolean`.
pub const BOOLEAN_SLOT: u32 = 5;
/// Global slot of `Number`.
pub const NUMBER_SLOT: u32 = 6;
/// Global slot of `String`.
pub const STRING_SLOT: u32 = 7;
/// Global slot of `Void`.
pub const VOID_SLOT: u32 = 8;
/// Global slot of `Null`.
pub const NULL_SLOT: u32 = 9;
/// Global slot of `Error`. Its subtypes follow in [`ErrorKind::ALL`] order.
pub const ERROR_SLOT: u32 = 10;
/// Global slots taken by core types.
pub const CORE_GLOBAL_SLOTS: u32 = ERROR_SLOT + 1 + ErrorKind::ALL.len() as u32;

/// Global slot of the core error type for `kind`.
pub fn error_slot(kind: ErrorKind) -> u32 {
    ERROR_SLOT + 1 + kind.index() as u32
}

/// Handles of the types created at boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoreTypes {
    /// Root of every type chain
    pub object: GcRef,
    /// Type of types
    pub type_: GcRef,
    /// Type of scope blocks
    pub block: GcRef,
    /// Type of functions
    pub function: GcRef,
    /// Core array
    pub array: GcRef,
    /// Boolean primitive
    pub boolean: GcRef,
    /// Number primitive
    pub number: GcRef,
    /// String primitive
    pub string: GcRef,
    /// Type of `undefined`
    pub void: GcRef,
    /// Type of `null`
    pub null: GcRef,
    /// Base of all core errors
    pub error: GcRef,
    /// Core error subtypes, in [`ErrorKind::ALL`] order
    pub errors: [GcRef; 14],
}

impl CoreTypes {
    /// The core error type for `kind`.
    pub fn error_type(&self, kind: ErrorKind) -> GcRef {
        self.errors[kind.index()]
    }

    /// The error kind `ty` stands for, if it is a core error subtype.
    pub fn error_kind(&self, ty: GcRef) -> Option<ErrorKind> {
        self.errors
            .iter()
            .position(|&candidate| candidate == ty)
            .map(|index| ErrorKind::ALL[index])
    }
}

impl Interpreter {
    /// Creates an interpreter with the core types loaded and nothing else.
    ///
    /// # Errors
    ///
    /// Fails only if the configured heap cannot hold the core types.
    pub fn new(config: InterpreterConfig) -> Result<Self, HostError> {
        let mut vm = Interpreter {
            heap: Heap::new(config.gc.clone()),
            stack: Vec::with_capacity(256.min(config.stack_size)),
            config,
            helpers: HelperSet::default(),
            core: CoreTypes::default(),
            global: GcRef::default(),
            frames: Vec::new(),
            frame_serial: 0,
            native_depth: 0,
            temp_roots: Vec::new(),
            exception: None,
            attention: Attention::None,
            cancel: CancelHandle::new(),
            registry: ModuleRegistry::new(),
            loaded: FxHashSet::default(),
            loading: Vec::new(),
            fixups: Vec::new(),
            pending_types: Vec::new(),
            initializers: VecDeque::new(),
            natives: FxHashMap::default(),
            host_callback: None,
            events: VecDeque::new(),
            memory_error: GcRef::default(),
            handling_memory_error: false,
            low_memory_reported: false,
        };
        vm.boot().map_err(|error| match error {
            VmError::Fatal(error) => HostError::Fatal(error),
            other => HostError::Fatal(core_types::JsError::new(
                ErrorKind::InternalError,
                other.to_string(),
            )),
        })?;
        Ok(vm)
    }

    fn boot(&mut self) -> VmResult<()> {
        let type_helpers = self.helpers.type_.clone();
        let object_helpers = self.helpers.object.clone();
        self.core.type_ = self.heap.allocate_with(Generation::ETERNAL, |me| {
            let mut cell = Obj::block(me, type_helpers.clone(), 0, BlockData::default());
            let mut data = TypeData::new(QualifiedName::public("Type"), type_helpers);
            data.flags = TypeFlags::CORE | TypeFlags::NATIVE;
            cell.kind = ObjKind::Type(Box::new(data));
            cell
        })?;

        let mut spec = TypeSpec::new(QualifiedName::public("Object"), None);
        spec.attributes = Attributes::DYNAMIC | Attributes::NATIVE;
        spec.helpers = Some(object_helpers.clone());
        self.core.object = self.create_type(spec)?;
        let object = self.core.object;
        if let Some(data) = self.type_data_mut(self.core.type_) {
            data.base = Some(object);
        }
        self.heap.note_edge(self.core.type_, object);

        self.core.block = self.core_type("Block", 0, 0, Some(object_helpers))?;
        let function_helpers = self.helpers.function.clone();
        self.core.function = self.core_type("Function", 0, 0, Some(function_helpers))?;
        let array_helpers = self.helpers.array.clone();
        self.core.array = self.core_type("Array", 2, 0, Some(array_helpers))?;
        let primitive = self.helpers.primitive.clone();
        self.core.boolean = self.core_type("Boolean", 0, 0, Some(primitive.clone()))?;
        self.core.number = self.core_type("Number", 0, 0, Some(primitive.clone()))?;
        self.core.string = self.core_type("String", 0, 0, Some(primitive.clone()))?;
        self.core.void = self.core_type("Void", 0, 0, Some(primitive.clone()))?;
        self.core.null = self.core_type("Null", 0, 0, Some(primitive))?;
        let error_helpers = self.helpers.error.clone();
        self.core.error = self.core_type("Error", 1, 2, Some(error_helpers))?;
        if let Some(data) = self.type_data_mut(self.core.error) {
            data.flags |= TypeFlags::DYNAMIC_INSTANCE;
        }

        for ty in [
            self.core.object,
            self.core.type_,
            self.core.block,
            self.core.function,
            self.core.array,
            self.core.boolean,
            self.core.number,
            self.core.string,
            self.core.void,
            self.core.null,
        ] {
            self.inherit_type(ty)?;
        }

        self.define_core_members()?;
        self.inherit_type(self.core.error)?;
        let base = self.core.error;
        for kind in ErrorKind::ALL {
            let spec = TypeSpec::new(QualifiedName::public(kind.type_name()), Some(base));
            let ty = self.create_type(spec)?;
            if let Some(data) = self.type_data_mut(ty) {
                data.flags |= TypeFlags::DYNAMIC_INSTANCE;
            }
            self.inherit_type(ty)?;
            self.core.errors[kind.index()] = ty;
        }

        let core = self.core;
        for ty in core_list(&core) {
            if let Some(data) = self.type_data_mut(ty) {
                data.flags |= TypeFlags::CORE;
                data.state = TypeState::Ready;
            }
        }

        self.create_global()?;
        let memory_type = self.core.error_type(ErrorKind::MemoryError);
        let memory_error = self.create_instance(memory_type, ObjKind::Error(Default::default()))?;
        self.set_named(memory_error, "message", Value::string("out of memory"))?;
        self.heap.make_permanent(memory_error, true);
        self.memory_error = memory_error;
        debug!(
            target: "ejs::vm",
            live = self.heap.live_count(),
            "core types created"
        );
        Ok(())
    }

    fn core_type(
        &mut self,
        name: &str,
        type_props: u32,
        instance_props: u32,
        helpers: Option<Arc<dyn Helpers>>,
    ) -> VmResult<GcRef> {
        let mut spec = TypeSpec::new(QualifiedName::public(name), Some(self.core.object));
        spec.type_props = type_props;
        spec.instance_props = instance_props;
        spec.attributes = Attributes::NATIVE;
        spec.helpers = helpers;
        self.create_type(spec)
    }

    fn define_core_members(&mut self) -> VmResult<()> {
        let array = self.core.array;
        self.define_native(array, 0, "Array", array_constructor, FunctionFlags::CONSTRUCTOR)?;
        self.define_native(array, 1, "length", array_length, FunctionFlags::GETTER)?;
        if let Some(data) = self.type_data_mut(array) {
            data.flags |= TypeFlags::HAS_CONSTRUCTOR;
        }

        let error = self.core.error;
        self.define_native(error, 0, "Error", error_constructor, FunctionFlags::CONSTRUCTOR)?;
        if let Some(data) = self.type_data_mut(error) {
            data.flags |= TypeFlags::HAS_CONSTRUCTOR;
        }
        let instance = self
            .type_data(error)
            .and_then(|data| data.instance_block)
            .ok_or_else(|| internal("Error has no instance block"))?;
        let string = self.core.string;
        self.define_slot(
            instance,
            Some(0),
            QualifiedName::public("message"),
            Trait::typed(Some(string), Attributes::empty()),
            Value::string(""),
        )?;
        self.define_slot(
            instance,
            Some(1),
            QualifiedName::public("stack"),
            Trait::typed(Some(string), Attributes::empty()),
            Value::string(""),
        )?;
        Ok(())
    }

    fn define_native(
        &mut self,
        ty: GcRef,
        slot: u32,
        name: &str,
        native: NativeFn,
        flags: FunctionFlags,
    ) -> VmResult<()> {
        let mut data = FunctionData::new(QualifiedName::public(name), FunctionBody::Native(native));
        data.owner = Some(ty);
        data.slot = Some(slot);
        data.flags = flags | FunctionFlags::NATIVE;
        let function = self.allocate_function(data, 0, Generation::ETERNAL)?;
        let mut attributes = Attributes::NATIVE;
        if flags.contains(FunctionFlags::CONSTRUCTOR) {
            attributes |= Attributes::CONSTRUCTOR;
        }
        if flags.contains(FunctionFlags::GETTER) {
            attributes |= Attributes::GETTER;
        }
        self.define_slot(
            ty,
            Some(slot),
            QualifiedName::public(name),
            Trait::new(attributes),
            Value::Object(function),
        )?;
        Ok(())
    }

    fn create_global(&mut self) -> VmResult<()> {
        let object = self.core.object;
        let helpers = self.helpers.object.clone();
        let cell = Obj::block(object, helpers, 0, BlockData::default());
        let global = self.heap.allocate_in(Generation::ETERNAL, cell)?;
        self.heap.make_permanent(global, true);
        self.global = global;

        let core = self.core;
        let type_type = core.type_;
        for (slot, ty) in core_list(&core).into_iter().enumerate() {
            let name = self
                .type_data(ty)
                .map(|data| data.qname.clone())
                .unwrap_or_default();
            self.define_slot(
                global,
                Some(slot as u32),
                name,
                Trait::typed(Some(type_type), Attributes::CONST),
                Value::Object(ty),
            )?;
        }
        Ok(())
    }
}

/// Core types in global slot order.
fn core_list(core: &CoreTypes) -> Vec<GcRef> {
    let mut list = vec![
        core.object,
        core.type_,
        core.block,
        core.function,
        core.array,
        core.boolean,
        core.number,
        core.string,
        core.void,
        core.null,
        core.error,
    ];
    list.extend_from_slice(&core.errors);
    list
}

fn error_constructor(vm: &mut Interpreter, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Some(error) = this.as_object() else {
        return vm.throw(ErrorKind::TypeError, "Error constructor called without an instance");
    };
    if let Some(message) = args.first() {
        let text = vm.to_string_value(message)?;
        vm.set_named(error, "message", Value::String(text))?;
    }
    Ok(Value::Undefined)
}

fn array_constructor(vm: &mut Interpreter, this: &Value, args: &[Value]) -> VmResult<Value> {
    let Some(array) = this.as_object() else {
        return vm.throw(ErrorKind::TypeError, "Array constructor called without an instance");
    };
    let elements = match args {
        [Value::Number(length)] if *length >= 0.0 && length.fract() == 0.0 => {
            vec![Value::Undefined; *length as usize]
        }
        _ => args.to_vec(),
    };
    if let Some(slot) = vm.obj_mut(array)?.as_array_mut() {
        *slot = elements;
    }
    vm.heap_mut().write_barrier_all(array);
    Ok(Value::Undefined)
}

fn array_length(vm: &mut Interpreter, this: &Value, _args: &[Value]) -> VmResult<Value> {
    let length = this
        .as_object()
        .and_then(|array| vm.heap().get(array))
        .and_then(Obj::as_array)
        .map(Vec::len);
    match length {
        Some(length) => Ok(Value::Number(length as f64)),
        None => vm.throw(ErrorKind::TypeError, "length getter applied to a non-array"),
    }
}
