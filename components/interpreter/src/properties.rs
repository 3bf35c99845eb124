//! Property access as bytecode sees it.
//!
//! Helper methods give raw access to an object's own store. The functions
//! here add what the language layers on top: getters and setters, method
//! lookup through the type chain, primitive receivers, constant slots and
//! implicit casts.

use crate::error::VmResult;
use crate::object::{Obj, ObjKind};
use crate::vm::Interpreter;
use bytecode_system::{Attributes, BaseIndex};
use core_types::{ErrorKind, GcRef, QualifiedName, Value};

impl Interpreter {
    /// Reads `slot` of `obj`, calling the getter stored there if any.
    pub fn get_slot(&mut self, obj: GcRef, slot: u32) -> VmResult<Value> {
        let helpers = self.obj(obj)?.helpers.clone();
        let value = helpers.get_property(self, obj, slot)?;
        self.apply_getter(value, &Value::Object(obj))
    }

    /// Writes `slot` of `obj`.
    ///
    /// A slot holding a getter routes the write to its paired setter, or
    /// rejects it when there is none. A `CONST` slot accepts one write
    /// while it is still undefined.
    pub fn set_slot(&mut self, obj: GcRef, slot: u32, value: Value) -> VmResult<()> {
        let cell = self.obj(obj)?;
        let current = cell.props.get(slot).cloned().unwrap_or_default();
        let attributes = cell.props.trait_at(slot).copied().unwrap_or_default();
        let constant = attributes.attributes.contains(Attributes::CONST);
        let helpers = cell.helpers.clone();

        if let Value::Object(function) = current {
            if self.is_getter(function) {
                return self.call_setter(function, &Value::Object(obj), value);
            }
        }
        if constant && current != Value::Undefined {
            let name = self
                .obj(obj)?
                .props
                .name(slot)
                .map_or_else(|| format!("slot {}", slot), |name| name.to_string());
            return self.throw(
                ErrorKind::TypeError,
                format!("cannot assign to constant {}", name),
            );
        }
        let value = self.coerce(value, attributes.declared_type)?;
        helpers.set_property(self, obj, slot, value)
    }

    fn call_setter(&mut self, getter: GcRef, this: &Value, value: Value) -> VmResult<()> {
        let (name, setter) = match self.obj(getter)?.as_function() {
            Some(data) => (data.name.to_string(), data.setter),
            None => (String::new(), None),
        };
        match setter {
            Some(setter) => {
                self.call_function(&Value::Object(setter), this.clone(), &[value])?;
                Ok(())
            }
            None => self.throw(
                ErrorKind::TypeError,
                format!("property '{}' has no setter", name),
            ),
        }
    }

    pub(crate) fn apply_getter(&mut self, value: Value, this: &Value) -> VmResult<Value> {
        match value {
            Value::Object(function) if self.is_getter(function) => {
                self.call_function(&Value::Object(function), this.clone(), &[])
            }
            other => Ok(other),
        }
    }

    /// Reads a public property of `obj` by name.
    pub fn get_named(&mut self, obj: GcRef, name: &str) -> VmResult<Value> {
        self.get_property(&Value::Object(obj), &QualifiedName::public(name))
    }

    /// Assigns a public property of `obj` by name.
    pub fn set_named(&mut self, obj: GcRef, name: &str, value: Value) -> VmResult<()> {
        self.set_property(&Value::Object(obj), &QualifiedName::public(name), value)
    }

    /// Reads `name` from `target`: own properties first, then members of
    /// its type chain. Missing properties read as undefined.
    pub fn get_property(&mut self, target: &Value, name: &QualifiedName) -> VmResult<Value> {
        match target {
            Value::Undefined | Value::Null => self.throw(
                ErrorKind::ReferenceError,
                format!("cannot read property '{}' of {}", name, target),
            ),
            Value::String(text) if name.is_public() && &*name.name == "length" => {
                Ok(Value::Number(text.chars().count() as f64))
            }
            Value::Object(obj) => {
                let helpers = self.obj(*obj)?.helpers.clone();
                if let Some(value) = helpers.get_property_by_name(self, *obj, name)? {
                    return self.apply_getter(value, target);
                }
                self.get_member(target, name)
            }
            _ => self.get_member(target, name),
        }
    }

    fn get_member(&mut self, receiver: &Value, name: &QualifiedName) -> VmResult<Value> {
        let ty = self.type_of_value(receiver);
        match self.find_in_type_chain(ty, name)? {
            Some((owner, slot)) => {
                let value = self.obj(owner)?.props.get(slot).cloned().unwrap_or_default();
                self.apply_getter(value, receiver)
            }
            None => Ok(Value::Undefined),
        }
    }

    /// First type in the chain starting at `ty` that names `name`, with the
    /// slot it names.
    pub fn find_in_type_chain(
        &mut self,
        ty: GcRef,
        name: &QualifiedName,
    ) -> VmResult<Option<(GcRef, u32)>> {
        let mut current = Some(ty);
        while let Some(ty) = current {
            if let Some(slot) = self.lookup_own(ty, name)? {
                return Ok(Some((ty, slot)));
            }
            current = self.base_of(ty);
        }
        Ok(None)
    }

    /// Assigns `name` on `target`.
    ///
    /// Existing own properties are written in place. Otherwise an accessor
    /// in the type chain handles the write, and failing that the object's
    /// helpers add the property (or reject it for sealed objects).
    pub fn set_property(
        &mut self,
        target: &Value,
        name: &QualifiedName,
        value: Value,
    ) -> VmResult<()> {
        let obj = match target {
            Value::Undefined | Value::Null => {
                return self.throw(
                    ErrorKind::ReferenceError,
                    format!("cannot set property '{}' of {}", name, target),
                )
            }
            Value::Object(obj) => *obj,
            other => {
                let kind = other.type_of();
                return self.throw(
                    ErrorKind::TypeError,
                    format!("cannot set property '{}' on a {}", name, kind),
                );
            }
        };

        let cell = self.obj(obj)?;
        let helpers = cell.helpers.clone();
        let is_type = matches!(cell.kind, ObjKind::Type(_));
        if is_type {
            if let Some((owner, slot)) = self.find_in_type_chain(obj, name)? {
                return self.set_slot(owner, slot, value);
            }
        } else if let Some(slot) = helpers.lookup_property(self, obj, name)? {
            return self.set_slot(obj, slot, value);
        }

        let ty = self.type_of_value(target);
        if let Some((owner, slot)) = self.find_in_type_chain(ty, name)? {
            if let Some(Value::Object(member)) = self.obj(owner)?.props.get(slot).cloned() {
                if self.is_getter(member) {
                    return self.call_setter(member, target, value);
                }
            }
        }
        helpers.set_property_by_name(self, obj, name, value)?;
        Ok(())
    }

    /// Deletes `name` from `target`. Primitives have nothing to delete.
    pub fn delete_property(&mut self, target: &Value, name: &QualifiedName) -> VmResult<bool> {
        match target {
            Value::Undefined | Value::Null => self.throw(
                ErrorKind::ReferenceError,
                format!("cannot delete property '{}' of {}", name, target),
            ),
            Value::Object(obj) => {
                let helpers = self.obj(*obj)?.helpers.clone();
                helpers.delete_property_by_name(self, *obj, name)
            }
            _ => Ok(false),
        }
    }

    /// `target[key]`.
    pub fn get_index(&mut self, target: &Value, key: &Value) -> VmResult<Value> {
        match (target, key) {
            (Value::String(text), Value::Number(index)) => {
                let found = element_position(*index)
                    .and_then(|index| text.chars().nth(index))
                    .map(|c| Value::string(c.to_string()));
                Ok(found.unwrap_or_default())
            }
            (Value::Object(obj), Value::Number(index)) if self.is_array(*obj) => {
                match element_position(*index) {
                    Some(index) => {
                        let helpers = self.obj(*obj)?.helpers.clone();
                        helpers.get_property(self, *obj, index as u32)
                    }
                    None => Ok(Value::Undefined),
                }
            }
            _ => {
                let name = QualifiedName::public(&*self.to_string_value(key)?);
                self.get_property(target, &name)
            }
        }
    }

    /// `target[key] = value`.
    pub fn set_index(&mut self, target: &Value, key: &Value, value: Value) -> VmResult<()> {
        if let (Value::Object(obj), Value::Number(index)) = (target, key) {
            if let (true, Some(index)) = (self.is_array(*obj), element_position(*index)) {
                let helpers = self.obj(*obj)?.helpers.clone();
                return helpers.set_property(self, *obj, index as u32, value);
            }
        }
        let name = QualifiedName::public(&*self.to_string_value(key)?);
        self.set_property(target, &name, value)
    }

    fn is_array(&self, obj: GcRef) -> bool {
        self.heap.get(obj).and_then(Obj::as_array).is_some()
    }

    /// Names of the named properties of `obj` in slot order. Properties
    /// whose trait is `HIDDEN` are listed only when asked for.
    pub fn get_property_names(
        &mut self,
        obj: GcRef,
        include_hidden: bool,
    ) -> VmResult<Vec<QualifiedName>> {
        let helpers = self.obj(obj)?.helpers.clone();
        let count = helpers.property_count(self, obj);
        let mut names = Vec::new();
        for slot in 0..count as u32 {
            let Some(name) = helpers.property_name(self, obj, slot) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let hidden = helpers
                .property_trait(self, obj, slot)
                .is_some_and(|t| t.attributes.contains(Attributes::HIDDEN));
            if hidden && !include_hidden {
                continue;
            }
            names.push(name);
        }
        Ok(names)
    }

    /// Type whose slots a receiver's type-slot instructions address: a type
    /// receiver addresses itself, anything else its type.
    pub fn receiver_type(&self, receiver: &Value) -> GcRef {
        if let Value::Object(r) = receiver {
            if let Some(cell) = self.heap.get(*r) {
                if matches!(cell.kind, ObjKind::Type(_)) {
                    return *r;
                }
            }
        }
        self.type_of_value(receiver)
    }

    /// Selects a type in the inheritance chain of `ty`.
    pub fn type_in_chain(&mut self, ty: GcRef, base: BaseIndex) -> VmResult<GcRef> {
        let mut chain = vec![ty];
        while let Some(next) = chain.last().and_then(|&last| self.base_of(last)) {
            if chain.len() > 4096 || chain.contains(&next) {
                break;
            }
            chain.push(next);
        }
        let found = match base {
            BaseIndex::FromType(n) => chain.get(n as usize).copied(),
            BaseIndex::FromRoot(n) => chain
                .len()
                .checked_sub(n as usize + 1)
                .and_then(|index| chain.get(index).copied()),
        };
        match found {
            Some(ty) => Ok(ty),
            None => {
                let name = self.type_name(ty);
                self.throw(
                    ErrorKind::ReferenceError,
                    format!("type chain of {} has no entry {:?}", name, base),
                )
            }
        }
    }

    /// Converts `value` to `ty` through the type's helpers.
    pub fn cast_value(&mut self, value: &Value, ty: GcRef) -> VmResult<Value> {
        let helpers = self.type_helpers(ty)?;
        helpers.cast(self, value, ty)
    }

    /// Casts `value` to a declared type unless it already conforms.
    /// Null and undefined pass unchanged.
    pub(crate) fn coerce(&mut self, value: Value, declared: Option<GcRef>) -> VmResult<Value> {
        match declared {
            Some(ty) if !value.is_nullish() && !self.instance_of(&value, ty) => {
                self.cast_value(&value, ty)
            }
            _ => Ok(value),
        }
    }

    /// Default cast: succeeds for instances of `ty`, null and undefined.
    pub fn checked_cast(&mut self, value: &Value, ty: GcRef) -> VmResult<Value> {
        if value.is_nullish() || self.instance_of(value, ty) {
            return Ok(value.clone());
        }
        let from = self.type_name(self.type_of_value(value));
        let to = self.type_name(ty);
        self.throw(
            ErrorKind::TypeError,
            format!("cannot cast {} to {}", from, to),
        )
    }

    /// Cast to a primitive type converts instead of checking.
    pub fn convert_primitive(&mut self, value: &Value, ty: GcRef) -> VmResult<Value> {
        let core = self.core;
        if ty == core.boolean {
            Ok(Value::Boolean(value.is_truthy()))
        } else if ty == core.number {
            Ok(Value::Number(self.to_number_value(value)?))
        } else if ty == core.string {
            Ok(Value::String(self.to_string_value(value)?))
        } else if ty == core.void {
            Ok(Value::Undefined)
        } else if ty == core.null {
            Ok(Value::Null)
        } else {
            self.checked_cast(value, ty)
        }
    }
}

fn element_position(index: f64) -> Option<usize> {
    (index >= 0.0 && index.fract() == 0.0 && index <= u32::MAX as f64).then_some(index as usize)
}
