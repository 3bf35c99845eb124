//! Helper vtables.
//!
//! Every object carries the helpers its type chose at creation. The
//! interpreter never touches a property store directly when executing
//! bytecode; it goes through these methods, so native types can change how
//! their instances store and expose properties.

use crate::error::VmResult;
use crate::object::{ErrorData, Obj, ObjKind, Trait};
use crate::operators::Operator;
use crate::vm::Interpreter;
use core_types::{ErrorKind, GcRef, QualifiedName, Value};
use memory_manager::Tracer;
use std::fmt;
use std::mem::size_of;
use std::sync::Arc;

/// Type-specific operations on objects.
///
/// Default methods implement a plain slot/name property store. The
/// property methods here are raw: getters and setters are applied by the
/// interpreter on top of them.
pub trait Helpers: fmt::Debug + Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str;

    /// Allocates an instance of `ty`, laid out from its instance block.
    fn create(&self, vm: &mut Interpreter, ty: GcRef) -> VmResult<GcRef> {
        vm.create_instance(ty, ObjKind::Object)
    }

    /// Converts `value` to an instance of `ty`.
    fn cast(&self, vm: &mut Interpreter, value: &Value, ty: GcRef) -> VmResult<Value> {
        vm.checked_cast(value, ty)
    }

    /// Copies `obj`. A deep copy also copies object-valued slots.
    fn clone_object(&self, vm: &mut Interpreter, obj: GcRef, deep: bool) -> VmResult<GcRef> {
        vm.clone_cell(obj, deep)
    }

    /// Value of `slot`.
    fn get_property(&self, vm: &mut Interpreter, obj: GcRef, slot: u32) -> VmResult<Value> {
        let value = vm.obj(obj)?.props.get(slot).cloned();
        match value {
            Some(value) => Ok(value),
            None => vm.throw(
                ErrorKind::ReferenceError,
                format!("slot {} is out of bounds", slot),
            ),
        }
    }

    /// Stores into `slot`. Slots past the end exist only on dynamic objects.
    fn set_property(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        slot: u32,
        value: Value,
    ) -> VmResult<()> {
        let cell = vm.obj(obj)?;
        if slot as usize >= cell.props.len() && !cell.is_dynamic() {
            return vm.throw(
                ErrorKind::ReferenceError,
                format!("slot {} is out of bounds", slot),
            );
        }
        vm.store_slot(obj, slot, value)
    }

    /// Value of a named property, `None` when the object has no such name.
    fn get_property_by_name(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        name: &QualifiedName,
    ) -> VmResult<Option<Value>> {
        match self.lookup_property(vm, obj, name)? {
            Some(slot) => self.get_property(vm, obj, slot).map(Some),
            None => Ok(None),
        }
    }

    /// Assigns a named property, adding it to dynamic objects. Returns the
    /// slot written.
    fn set_property_by_name(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        name: &QualifiedName,
        value: Value,
    ) -> VmResult<u32> {
        if let Some(slot) = self.lookup_property(vm, obj, name)? {
            self.set_property(vm, obj, slot, value)?;
            return Ok(slot);
        }
        if !vm.obj(obj)?.is_dynamic() {
            return vm.throw(
                ErrorKind::TypeError,
                format!("cannot add property '{}' to a sealed object", name),
            );
        }
        self.define_property(vm, obj, None, name.clone(), Trait::default(), value)
    }

    /// Defines slot, name, trait and value together.
    fn define_property(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        slot: Option<u32>,
        name: QualifiedName,
        attributes: Trait,
        value: Value,
    ) -> VmResult<u32> {
        vm.define_slot(obj, slot, name, attributes, value)
    }

    /// Deletes `slot`. Only dynamic objects allow it.
    fn delete_property(&self, vm: &mut Interpreter, obj: GcRef, slot: u32) -> VmResult<bool> {
        let cell = vm.obj_mut(obj)?;
        if !cell.is_dynamic() {
            return vm.throw(
                ErrorKind::TypeError,
                "cannot delete a property of a sealed object",
            );
        }
        Ok(cell.props.delete(slot))
    }

    /// Deletes a named property.
    fn delete_property_by_name(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        name: &QualifiedName,
    ) -> VmResult<bool> {
        match self.lookup_property(vm, obj, name)? {
            Some(slot) => self.delete_property(vm, obj, slot),
            None => Ok(false),
        }
    }

    /// Number of slots.
    fn property_count(&self, vm: &Interpreter, obj: GcRef) -> usize {
        vm.heap().get(obj).map_or(0, |cell| cell.props.len())
    }

    /// Name of `slot`.
    fn property_name(&self, vm: &Interpreter, obj: GcRef, slot: u32) -> Option<QualifiedName> {
        vm.heap()
            .get(obj)
            .and_then(|cell| cell.props.name(slot).cloned())
    }

    /// Trait of `slot`.
    fn property_trait(&self, vm: &Interpreter, obj: GcRef, slot: u32) -> Option<Trait> {
        vm.heap()
            .get(obj)
            .and_then(|cell| cell.props.trait_at(slot).copied())
    }

    /// Slot of a name. A public name also matches in the object's open
    /// namespaces, then in any namespace if only one holds it.
    fn lookup_property(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        name: &QualifiedName,
    ) -> VmResult<Option<u32>> {
        vm.lookup_own(obj, name)
    }

    /// Applies an operator to an instance. `None` selects the default
    /// semantics.
    fn invoke_operator(
        &self,
        _vm: &mut Interpreter,
        _op: Operator,
        _lhs: &Value,
        _rhs: Option<&Value>,
    ) -> VmResult<Option<Value>> {
        Ok(None)
    }

    /// Reports the references `obj` holds.
    fn mark(&self, obj: &Obj, tracer: &mut Tracer) {
        mark_object(obj, tracer);
    }

    /// True if instances need [`Helpers::finalize`] before destruction.
    fn has_finalizer(&self) -> bool {
        false
    }

    /// Releases external resources of `obj`.
    fn finalize(&self, _obj: &mut Obj) {}
}

/// Reports every reference held by the common parts of an object.
pub fn mark_object(obj: &Obj, tracer: &mut Tracer) {
    tracer.edge(obj.ty);
    tracer.values(obj.props.values());
    for attributes in obj.props.traits() {
        tracer.optional(attributes.declared_type);
    }
    if let Some(block) = obj.block_data() {
        tracer.optional(block.scope.heap());
        tracer.optional(block.with_target);
    }
    match &obj.kind {
        ObjKind::Object | ObjKind::Block | ObjKind::Error(_) => {}
        ObjKind::Type(data) => {
            tracer.optional(data.base);
            tracer.optional(data.instance_block);
            tracer.optional(data.initializer);
            for &interface in &data.implements {
                tracer.edge(interface);
            }
        }
        ObjKind::Function(data) => {
            tracer.optional(data.owner);
            tracer.optional(data.setter);
            tracer.optional(data.template);
            tracer.optional(data.return_type);
            if let Some(this) = &data.bound_this {
                tracer.value(this);
            }
            for ty in data.arg_types.iter().chain(data.catch_types.iter()) {
                tracer.optional(*ty);
            }
        }
        ObjKind::Array(elements) => tracer.values(elements),
    }
}

/// Plain objects, blocks and global objects.
#[derive(Debug, Default)]
pub struct ObjectHelpers;

impl Helpers for ObjectHelpers {
    fn name(&self) -> &'static str {
        "Object"
    }
}

/// Functions and closures.
#[derive(Debug, Default)]
pub struct FunctionHelpers;

impl Helpers for FunctionHelpers {
    fn name(&self) -> &'static str {
        "Function"
    }

    fn clone_object(&self, vm: &mut Interpreter, obj: GcRef, _deep: bool) -> VmResult<GcRef> {
        vm.clone_cell(obj, false)
    }
}

/// Type objects. Static lookups continue into base types.
#[derive(Debug, Default)]
pub struct TypeHelpers;

impl Helpers for TypeHelpers {
    fn name(&self) -> &'static str {
        "Type"
    }

    fn create(&self, vm: &mut Interpreter, _ty: GcRef) -> VmResult<GcRef> {
        vm.throw(
            ErrorKind::TypeError,
            "types are created by the loader, not by construction",
        )
    }

    fn clone_object(&self, _vm: &mut Interpreter, obj: GcRef, _deep: bool) -> VmResult<GcRef> {
        Ok(obj)
    }

    fn get_property_by_name(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        name: &QualifiedName,
    ) -> VmResult<Option<Value>> {
        let mut current = Some(obj);
        while let Some(ty) = current {
            if let Some(slot) = vm.lookup_own(ty, name)? {
                return self.get_property(vm, ty, slot).map(Some);
            }
            current = vm.base_of(ty);
        }
        Ok(None)
    }
}

/// Core arrays: elements are addressed by slot and by numeric name.
#[derive(Debug, Default)]
pub struct ArrayHelpers;

/// Most elements one store may add past the end of an array.
pub const MAX_ELEMENT_GROWTH: usize = 1 << 20;

fn element_index(name: &QualifiedName) -> Option<u32> {
    if name.is_public() && !name.name.is_empty() && name.name.bytes().all(|b| b.is_ascii_digit()) {
        name.name.parse().ok()
    } else {
        None
    }
}

impl Helpers for ArrayHelpers {
    fn name(&self) -> &'static str {
        "Array"
    }

    fn create(&self, vm: &mut Interpreter, ty: GcRef) -> VmResult<GcRef> {
        vm.create_instance(ty, ObjKind::Array(Vec::new()))
    }

    fn get_property(&self, vm: &mut Interpreter, obj: GcRef, slot: u32) -> VmResult<Value> {
        Ok(vm
            .obj(obj)?
            .as_array()
            .and_then(|elements| elements.get(slot as usize).cloned())
            .unwrap_or_default())
    }

    fn set_property(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        slot: u32,
        value: Value,
    ) -> VmResult<()> {
        let index = slot as usize;
        let Some(len) = vm.obj(obj)?.as_array().map(Vec::len) else {
            return Ok(());
        };
        if index >= len {
            let growth = index + 1 - len;
            if growth > MAX_ELEMENT_GROWTH {
                return vm.throw(
                    ErrorKind::ResourceError,
                    format!("array index {} is too far past its length {}", index, len),
                );
            }
            if vm.heap_mut().charge(obj, growth * size_of::<Value>()).is_err() {
                return Err(vm.out_of_memory());
            }
        }
        let stored = match vm.obj_mut(obj)?.as_array_mut() {
            Some(elements) if index >= elements.len() => {
                let growth = index + 1 - elements.len();
                let reserved = elements.try_reserve(growth).is_ok();
                if reserved {
                    elements.resize(index + 1, Value::Undefined);
                    elements[index] = value.clone();
                }
                reserved
            }
            Some(elements) => {
                elements[index] = value.clone();
                true
            }
            None => true,
        };
        if !stored {
            return Err(vm.out_of_memory());
        }
        vm.heap_mut().write_barrier(obj, &value);
        Ok(())
    }

    fn get_property_by_name(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        name: &QualifiedName,
    ) -> VmResult<Option<Value>> {
        match element_index(name) {
            Some(index) => self.get_property(vm, obj, index).map(Some),
            None => match vm.lookup_own(obj, name)? {
                Some(slot) => Ok(vm.obj(obj)?.props.get(slot).cloned()),
                None => Ok(None),
            },
        }
    }

    fn set_property_by_name(
        &self,
        vm: &mut Interpreter,
        obj: GcRef,
        name: &QualifiedName,
        value: Value,
    ) -> VmResult<u32> {
        match element_index(name) {
            Some(index) => {
                self.set_property(vm, obj, index, value)?;
                Ok(index)
            }
            None => {
                if let Some(slot) = vm.lookup_own(obj, name)? {
                    vm.store_slot(obj, slot, value)?;
                    return Ok(slot);
                }
                vm.define_slot(obj, None, name.clone(), Trait::default(), value)
            }
        }
    }

    fn delete_property(&self, vm: &mut Interpreter, obj: GcRef, slot: u32) -> VmResult<bool> {
        Ok(match vm.obj_mut(obj)?.as_array_mut() {
            Some(elements) if (slot as usize) < elements.len() => {
                elements[slot as usize] = Value::Undefined;
                true
            }
            _ => false,
        })
    }

    fn property_count(&self, vm: &Interpreter, obj: GcRef) -> usize {
        vm.heap()
            .get(obj)
            .and_then(Obj::as_array)
            .map_or(0, Vec::len)
    }

    fn property_name(&self, vm: &Interpreter, obj: GcRef, slot: u32) -> Option<QualifiedName> {
        let len = self.property_count(vm, obj);
        ((slot as usize) < len).then(|| QualifiedName::public(slot.to_string()))
    }
}

/// Core error instances carry a backtrace next to their properties.
#[derive(Debug, Default)]
pub struct ErrorHelpers;

impl Helpers for ErrorHelpers {
    fn name(&self) -> &'static str {
        "Error"
    }

    fn create(&self, vm: &mut Interpreter, ty: GcRef) -> VmResult<GcRef> {
        vm.create_instance(ty, ObjKind::Error(Box::new(ErrorData::default())))
    }
}

/// Boolean, Number, String, Void and Null. Casting to these types converts
/// instead of checking.
#[derive(Debug, Default)]
pub struct PrimitiveHelpers;

impl Helpers for PrimitiveHelpers {
    fn name(&self) -> &'static str {
        "Primitive"
    }

    fn create(&self, vm: &mut Interpreter, ty: GcRef) -> VmResult<GcRef> {
        let name = vm.type_name(ty);
        vm.throw(
            ErrorKind::TypeError,
            format!("{} values are not constructed as objects", name),
        )
    }

    fn cast(&self, vm: &mut Interpreter, value: &Value, ty: GcRef) -> VmResult<Value> {
        vm.convert_primitive(value, ty)
    }
}

/// Shared helper instances used by the core types.
#[derive(Debug, Clone)]
pub struct HelperSet {
    /// Plain objects and blocks
    pub object: Arc<dyn Helpers>,
    /// Functions
    pub function: Arc<dyn Helpers>,
    /// Types
    pub type_: Arc<dyn Helpers>,
    /// Arrays
    pub array: Arc<dyn Helpers>,
    /// Errors
    pub error: Arc<dyn Helpers>,
    /// Primitive types
    pub primitive: Arc<dyn Helpers>,
}

impl Default for HelperSet {
    fn default() -> Self {
        HelperSet {
            object: Arc::new(ObjectHelpers),
            function: Arc::new(FunctionHelpers),
            type_: Arc::new(TypeHelpers),
            array: Arc::new(ArrayHelpers),
            error: Arc::new(ErrorHelpers),
            primitive: Arc::new(PrimitiveHelpers),
        }
    }
}
