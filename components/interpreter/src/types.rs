//! The type system.
//!
//! A type is a block whose slots are its static members and methods. It
//! links to its base type, the interfaces it implements and an instance
//! block: the template every new instance copies its slots, traits and
//! names from. Inherited members are spliced in front of a type's own slots
//! by [`Interpreter::inherit_type`], so a member keeps the same slot number
//! in every derived type.

use crate::block::BlockData;
use crate::error::{VmError, VmResult};
use crate::function::{FunctionBody, FunctionData, FunctionFlags, NativeFn};
use crate::helpers::Helpers;
use crate::object::{Obj, ObjKind, Trait};
use crate::vm::Interpreter;
use bitflags::bitflags;
use bytecode_system::Attributes;
use core_types::{ErrorKind, GcRef, JsError, QualifiedName, Value};
use memory_manager::Generation;
use std::sync::Arc;
use tracing::debug;

bitflags! {
    /// Properties of a type.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct TypeFlags: u16 {
        /// The first own slot holds the constructor
        const HAS_CONSTRUCTOR = 1 << 0;
        /// Instances accept new properties at runtime
        const DYNAMIC_INSTANCE = 1 << 1;
        /// Interface type
        const INTERFACE = 1 << 2;
        /// Cannot be subclassed
        const FINAL = 1 << 3;
        /// Implemented by the host
        const NATIVE = 1 << 4;
        /// Base type was not resolved when the type was declared
        const NEEDS_FIXUP = 1 << 5;
        /// Has a static initializer
        const HAS_INITIALIZER = 1 << 6;
        /// Created at interpreter boot
        const CORE = 1 << 7;
    }
}

/// Lifecycle of a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TypeState {
    /// Own members defined, inheritance not applied yet
    Declared,
    /// Base and interface members spliced in
    TraitsFixedUp,
    /// Static initializer is running
    InitializerRun,
    /// Usable
    Ready,
}

/// Payload of a type object.
#[derive(Debug, Clone)]
pub struct TypeData {
    /// Qualified type name
    pub qname: QualifiedName,
    /// Base type; `None` only for `Object` and unresolved bases
    pub base: Option<GcRef>,
    /// Implemented interfaces
    pub implements: Vec<GcRef>,
    /// Instance layout template
    pub instance_block: Option<GcRef>,
    /// Type properties
    pub flags: TypeFlags,
    /// Lifecycle state
    pub state: TypeState,
    /// Helpers given to instances
    pub instance_helpers: Arc<dyn Helpers>,
    /// Static initializer
    pub initializer: Option<GcRef>,
    /// Defining module
    pub module: Option<Arc<str>>,
    /// Static slots declared by the type itself
    pub own_type_props: u32,
    /// Instance slots declared by the type itself
    pub own_instance_props: u32,
}

impl TypeData {
    /// A declared type with no members.
    pub fn new(qname: QualifiedName, instance_helpers: Arc<dyn Helpers>) -> Self {
        TypeData {
            qname,
            base: None,
            implements: Vec::new(),
            instance_block: None,
            flags: TypeFlags::empty(),
            state: TypeState::Declared,
            instance_helpers,
            initializer: None,
            module: None,
            own_type_props: 0,
            own_instance_props: 0,
        }
    }
}

/// Arguments of [`Interpreter::create_type`].
#[derive(Debug, Clone)]
pub struct TypeSpec {
    /// Qualified name
    pub name: QualifiedName,
    /// Base type, if already known
    pub base: Option<GcRef>,
    /// Own static slots
    pub type_props: u32,
    /// Own instance slots
    pub instance_props: u32,
    /// Declaration attributes
    pub attributes: Attributes,
    /// Helpers for instances; the base type's when `None`
    pub helpers: Option<Arc<dyn Helpers>>,
}

impl TypeSpec {
    /// A type deriving from `base` with no declared members.
    pub fn new(name: QualifiedName, base: Option<GcRef>) -> Self {
        TypeSpec {
            name,
            base,
            type_props: 0,
            instance_props: 0,
            attributes: Attributes::empty(),
            helpers: None,
        }
    }
}

impl Interpreter {
    /// Allocates a type in the eternal generation, plus its instance block
    /// when it declares instance slots.
    ///
    /// The type starts [`TypeState::Declared`]; [`Interpreter::inherit_type`]
    /// applies its base's layout.
    pub fn create_type(&mut self, spec: TypeSpec) -> VmResult<GcRef> {
        let helpers = match (&spec.helpers, spec.base) {
            (Some(helpers), _) => helpers.clone(),
            (None, Some(base)) => self
                .heap()
                .get(base)
                .and_then(Obj::as_type)
                .map(|data| data.instance_helpers.clone())
                .unwrap_or_else(|| self.helper_set().object.clone()),
            (None, None) => self.helper_set().object.clone(),
        };
        let mut data = TypeData::new(spec.name.clone(), helpers);
        data.base = spec.base;
        data.own_type_props = spec.type_props;
        data.own_instance_props = spec.instance_props;
        if spec.attributes.contains(Attributes::DYNAMIC) {
            data.flags |= TypeFlags::DYNAMIC_INSTANCE;
        }
        if spec.attributes.contains(Attributes::INTERFACE) {
            data.flags |= TypeFlags::INTERFACE;
        }
        if spec.attributes.contains(Attributes::FINAL) {
            data.flags |= TypeFlags::FINAL;
        }
        if spec.attributes.contains(Attributes::NATIVE) {
            data.flags |= TypeFlags::NATIVE;
        }
        if spec.instance_props > 0 {
            data.instance_block = Some(self.allocate_instance_block(spec.instance_props as usize)?);
        }

        let type_type = self.core().type_;
        let helpers = self.helper_set().type_.clone();
        let mut cell = Obj::block(
            type_type,
            helpers,
            spec.type_props as usize,
            BlockData::default(),
        );
        cell.kind = ObjKind::Type(Box::new(data));
        let ty = self.heap_mut().allocate_in(Generation::ETERNAL, cell)?;
        debug!(target: "ejs::loader", name = %spec.name, "type declared");
        Ok(ty)
    }

    pub(crate) fn allocate_instance_block(&mut self, slots: usize) -> VmResult<GcRef> {
        let block_type = self.core().block;
        let helpers = self.helper_set().object.clone();
        let cell = Obj::block(block_type, helpers, slots, BlockData::default());
        Ok(self.heap_mut().allocate_in(Generation::ETERNAL, cell)?)
    }

    /// Type payload of `ty`.
    pub fn type_data(&self, ty: GcRef) -> Option<&TypeData> {
        self.heap().get(ty).and_then(Obj::as_type)
    }

    pub(crate) fn type_data_mut(&mut self, ty: GcRef) -> Option<&mut TypeData> {
        self.heap_mut().get_mut(ty).and_then(Obj::as_type_mut)
    }

    /// Base type of `ty`.
    pub fn base_of(&self, ty: GcRef) -> Option<GcRef> {
        self.type_data(ty).and_then(|data| data.base)
    }

    /// Display name of a type.
    pub fn type_name(&self, ty: GcRef) -> String {
        self.type_data(ty)
            .map(|data| data.qname.name.to_string())
            .unwrap_or_else(|| "<unknown>".to_string())
    }

    /// True if `a` is `b`, derives from it, or implements it.
    pub fn is_subtype_of(&self, a: GcRef, b: GcRef) -> bool {
        let mut pending = vec![a];
        let mut steps = 0usize;
        while let Some(ty) = pending.pop() {
            if ty == b {
                return true;
            }
            steps += 1;
            if steps > 4096 {
                break;
            }
            if let Some(data) = self.type_data(ty) {
                pending.extend(data.implements.iter().copied());
                pending.extend(data.base);
            }
        }
        false
    }

    /// Splices the base type's and interfaces' members into `ty`.
    ///
    /// Own static slots move up past the base's slots; instance slots move
    /// up past the base's instance slots. Own members flagged `OVERRIDE`
    /// take over the inherited slot of the same name. Running it on a type
    /// that is already fixed up does nothing.
    pub fn inherit_type(&mut self, ty: GcRef) -> VmResult<()> {
        let Some(data) = self.type_data(ty) else {
            return Err(internal("inherit_type on a non-type"));
        };
        if data.state >= TypeState::TraitsFixedUp {
            return Ok(());
        }
        let base = data.base;
        let implements = data.implements.clone();

        if let Some(base) = base {
            let base_data = self
                .type_data(base)
                .ok_or_else(|| internal("base is not a type"))?;
            if base_data.flags.contains(TypeFlags::FINAL) {
                let name = self.type_name(base);
                return self.throw(
                    ErrorKind::TypeError,
                    format!("cannot derive from final type {}", name),
                );
            }
            if base_data.state < TypeState::TraitsFixedUp {
                return Err(internal("base type is not fixed up"));
            }
            let base_instance = base_data.instance_block;
            let base_count = self.obj(base)?.props.len();

            let cell = self.obj_mut(ty)?;
            cell.props.insert_room(base_count, 0);
            if let Some(block) = cell.block_data_mut() {
                block.num_inherited = base_count as u32;
            }
            self.apply_overrides(ty, base, base_count)?;
            self.inherit_traits(ty, base, base_count, 0, false)?;

            if let Some(base_instance) = base_instance {
                let base_slots = self.obj(base_instance)?.props.len();
                let instance = match self.type_data(ty).and_then(|d| d.instance_block) {
                    Some(instance) => instance,
                    None => {
                        let block = self.allocate_instance_block(0)?;
                        if let Some(data) = self.type_data_mut(ty) {
                            data.instance_block = Some(block);
                        }
                        self.heap_mut().note_edge(ty, block);
                        block
                    }
                };
                let cell = self.obj_mut(instance)?;
                cell.props.insert_room(base_slots, 0);
                if let Some(block) = cell.block_data_mut() {
                    block.num_inherited = base_slots as u32;
                }
                self.inherit_traits(instance, base_instance, base_slots, 0, false)?;
            }
        }

        for interface in implements {
            let count = self.obj(interface)?.props.len();
            self.inherit_traits(ty, interface, count, 0, true)?;
        }

        if let Some(data) = self.type_data_mut(ty) {
            data.state = TypeState::TraitsFixedUp;
            data.flags.remove(TypeFlags::NEEDS_FIXUP);
        }
        self.heap_mut().write_barrier_all(ty);
        Ok(())
    }

    /// Copies `count` traits of `base` into `derived`.
    ///
    /// For classes the run lands at `offset`; static members contribute
    /// their trait only, other members their name and value too, and a
    /// derived slot already flagged `OVERRIDE` is left alone. For
    /// interfaces only members the derived type lacks are appended.
    pub fn inherit_traits(
        &mut self,
        derived: GcRef,
        base: GcRef,
        count: usize,
        offset: usize,
        is_interface: bool,
    ) -> VmResult<()> {
        let source = self.obj(base)?.props.clone();
        let count = count.min(source.len());
        let target = self.obj_mut(derived)?;
        for slot in 0..count as u32 {
            let attributes = source.trait_at(slot).copied().unwrap_or_default();
            let name = source.name(slot).cloned();
            let value = source.get(slot).cloned().unwrap_or_default();
            if is_interface {
                let Some(name) = name else { continue };
                if attributes.attributes.contains(Attributes::STATIC)
                    || target.props.lookup(&name).is_some()
                {
                    continue;
                }
                target.props.define(None, name, attributes, value);
                continue;
            }
            let at = offset as u32 + slot;
            let existing = target.props.trait_at(at).copied().unwrap_or_default();
            if existing.attributes.contains(Attributes::OVERRIDE) {
                continue;
            }
            target.props.set_trait(at, attributes);
            let is_static = attributes.attributes.contains(Attributes::STATIC);
            let is_constructor = attributes.attributes.contains(Attributes::CONSTRUCTOR);
            if !is_static {
                target.props.set(Some(at), value);
                if let (Some(name), false) = (name, is_constructor) {
                    target.props.set_name(at, name);
                }
            }
        }
        self.heap_mut().write_barrier_all(derived);
        Ok(())
    }

    fn apply_overrides(&mut self, ty: GcRef, base: GcRef, base_count: usize) -> VmResult<()> {
        let base_props = self.obj(base)?.props.clone();
        let own_len = self.obj(ty)?.props.len();
        for slot in base_count as u32..own_len as u32 {
            let cell = self.obj_mut(ty)?;
            let attributes = cell.props.trait_at(slot).copied().unwrap_or_default();
            if !attributes.attributes.contains(Attributes::OVERRIDE) {
                continue;
            }
            let Some(name) = cell.props.name(slot).cloned() else {
                continue;
            };
            let Some(inherited) = base_props.lookup(&name) else {
                continue;
            };
            let value = cell.props.get(slot).cloned().unwrap_or_default();
            cell.props.define(Some(inherited), name, attributes, value.clone());
            cell.props.set_name(slot, QualifiedName::default());
            if let Value::Object(function) = value {
                if let Some(data) = self.heap_mut().get_mut(function).and_then(Obj::as_function_mut)
                {
                    data.slot = Some(inherited);
                }
            }
        }
        Ok(())
    }

    /// The constructor of `ty`, if it declares one.
    pub fn constructor_of(&self, ty: GcRef) -> Option<GcRef> {
        let cell = self.heap().get(ty)?;
        let data = cell.as_type()?;
        if !data.flags.contains(TypeFlags::HAS_CONSTRUCTOR) {
            return None;
        }
        cell.props
            .get(cell.num_inherited())
            .and_then(Value::as_object)
    }

    /// Attaches a host implementation to a declared function slot of `ty`.
    ///
    /// A slot that already holds bytecode cannot be rebound. An empty slot
    /// gets a new native function.
    pub fn bind_native_method(
        &mut self,
        ty: GcRef,
        slot: u32,
        name: &str,
        native: NativeFn,
    ) -> VmResult<()> {
        let existing = self.obj(ty)?.props.get(slot).and_then(Value::as_object);
        if let Some(function) = existing {
            if let Some(data) = self.heap_mut().get_mut(function).and_then(Obj::as_function_mut) {
                if data.is_script() {
                    return Err(VmError::Fatal(JsError::new(
                        ErrorKind::InternalError,
                        format!("slot {} of {} already holds compiled code", slot, name),
                    )));
                }
                data.body = FunctionBody::Native(native);
                data.flags |= FunctionFlags::NATIVE;
                return Ok(());
            }
        }
        let mut data = FunctionData::new(QualifiedName::parse(name), FunctionBody::Native(native));
        data.owner = Some(ty);
        data.slot = Some(slot);
        data.flags = FunctionFlags::NATIVE;
        let function = self.allocate_function(data, 0, Generation::ETERNAL)?;
        self.define_slot(
            ty,
            Some(slot),
            QualifiedName::parse(name),
            Trait::new(Attributes::NATIVE),
            Value::Object(function),
        )?;
        Ok(())
    }
}

pub(crate) fn internal(message: &str) -> VmError {
    VmError::Fatal(JsError::new(ErrorKind::InternalError, message))
}
