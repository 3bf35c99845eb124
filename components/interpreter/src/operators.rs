//! Operator semantics and value conversions.
//!
//! Object operands are offered to their type's helpers first
//! ([`Helpers::invoke_operator`]); the defaults below apply when the
//! helpers decline.
//!
//! [`Helpers::invoke_operator`]: crate::helpers::Helpers::invoke_operator

use crate::error::VmResult;
use crate::function::FunctionData;
use crate::object::{Obj, ObjKind};
use crate::types::internal;
use crate::vm::Interpreter;
use bytecode_system::{Attributes, Opcode};
use core_types::{ErrorKind, GcRef, QualifiedName, Value};
use num_traits::ToPrimitive;
use std::cmp::Ordering;
use std::sync::Arc;

/// Operators with a dedicated opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Neg,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    BitNot,
    Not,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
    TypeOf,
    InstanceOf,
    Cast,
    Like,
}

impl Operator {
    /// The operator an opcode applies, if it is an operator opcode.
    pub fn from_opcode(opcode: &Opcode) -> Option<Operator> {
        Some(match opcode {
            Opcode::Add => Operator::Add,
            Opcode::Sub => Operator::Sub,
            Opcode::Mul => Operator::Mul,
            Opcode::Div => Operator::Div,
            Opcode::Rem => Operator::Rem,
            Opcode::Neg => Operator::Neg,
            Opcode::BitAnd => Operator::BitAnd,
            Opcode::BitOr => Operator::BitOr,
            Opcode::BitXor => Operator::BitXor,
            Opcode::Shl => Operator::Shl,
            Opcode::Shr => Operator::Shr,
            Opcode::UShr => Operator::UShr,
            Opcode::BitNot => Operator::BitNot,
            Opcode::Not => Operator::Not,
            Opcode::Eq => Operator::Eq,
            Opcode::Ne => Operator::Ne,
            Opcode::StrictEq => Operator::StrictEq,
            Opcode::StrictNe => Operator::StrictNe,
            Opcode::Lt => Operator::Lt,
            Opcode::Le => Operator::Le,
            Opcode::Gt => Operator::Gt,
            Opcode::Ge => Operator::Ge,
            Opcode::TypeOf => Operator::TypeOf,
            Opcode::InstanceOf => Operator::InstanceOf,
            Opcode::Cast => Operator::Cast,
            Opcode::Like => Operator::Like,
            _ => return None,
        })
    }

    /// True for operators taking one operand.
    pub fn is_unary(self) -> bool {
        matches!(
            self,
            Operator::Neg | Operator::BitNot | Operator::Not | Operator::TypeOf
        )
    }

    /// Operators a type may redefine. Identity, type tests and `typeof`
    /// always keep their built-in meaning.
    fn overloadable(self) -> bool {
        !matches!(
            self,
            Operator::StrictEq
                | Operator::StrictNe
                | Operator::TypeOf
                | Operator::InstanceOf
                | Operator::Cast
                | Operator::Like
                | Operator::Not
        )
    }
}

/// ECMAScript `ToInt32`.
pub fn to_int32(n: f64) -> i32 {
    to_uint32(n) as i32
}

/// ECMAScript `ToUint32`.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    n.trunc().rem_euclid(4_294_967_296.0).to_u32().unwrap_or(0)
}

impl Interpreter {
    /// Applies a unary operator.
    pub fn apply_unary(&mut self, op: Operator, value: &Value) -> VmResult<Value> {
        if let Some(result) = self.overloaded(op, value, None)? {
            return Ok(result);
        }
        Ok(match op {
            Operator::Neg => Value::Number(-self.to_number_value(value)?),
            Operator::BitNot => Value::Number(f64::from(!to_int32(self.to_number_value(value)?))),
            Operator::Not => Value::Boolean(!value.is_truthy()),
            Operator::TypeOf => Value::string(self.typeof_str(value)),
            other => return Err(internal(&format!("{:?} is not unary", other))),
        })
    }

    /// Applies a binary operator.
    pub fn apply_binary(&mut self, op: Operator, lhs: &Value, rhs: &Value) -> VmResult<Value> {
        if let Some(result) = self.overloaded(op, lhs, Some(rhs))? {
            return Ok(result);
        }
        match op {
            Operator::Add => self.add(lhs, rhs),
            Operator::Sub | Operator::Mul | Operator::Div | Operator::Rem => {
                let a = self.to_number_value(lhs)?;
                let b = self.to_number_value(rhs)?;
                Ok(Value::Number(match op {
                    Operator::Sub => a - b,
                    Operator::Mul => a * b,
                    Operator::Div => a / b,
                    _ => a % b,
                }))
            }
            Operator::BitAnd
            | Operator::BitOr
            | Operator::BitXor
            | Operator::Shl
            | Operator::Shr
            | Operator::UShr => {
                let a = self.to_number_value(lhs)?;
                let b = self.to_number_value(rhs)?;
                let shift = to_uint32(b) & 31;
                Ok(Value::Number(match op {
                    Operator::BitAnd => f64::from(to_int32(a) & to_int32(b)),
                    Operator::BitOr => f64::from(to_int32(a) | to_int32(b)),
                    Operator::BitXor => f64::from(to_int32(a) ^ to_int32(b)),
                    Operator::Shl => f64::from(to_int32(a).wrapping_shl(shift)),
                    Operator::Shr => f64::from(to_int32(a) >> shift),
                    _ => f64::from(to_uint32(a) >> shift),
                }))
            }
            Operator::Eq => Ok(Value::Boolean(self.loose_equals(lhs, rhs)?)),
            Operator::Ne => Ok(Value::Boolean(!self.loose_equals(lhs, rhs)?)),
            Operator::StrictEq => Ok(Value::Boolean(lhs == rhs)),
            Operator::StrictNe => Ok(Value::Boolean(lhs != rhs)),
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
                let ordering = self.compare(lhs, rhs)?;
                Ok(Value::Boolean(match (op, ordering) {
                    (_, None) => false,
                    (Operator::Lt, Some(o)) => o == Ordering::Less,
                    (Operator::Le, Some(o)) => o != Ordering::Greater,
                    (Operator::Gt, Some(o)) => o == Ordering::Greater,
                    (_, Some(o)) => o != Ordering::Less,
                }))
            }
            Operator::InstanceOf => {
                let ty = self.expect_type(rhs, "instanceof")?;
                Ok(Value::Boolean(!lhs.is_nullish() && self.instance_of(lhs, ty)))
            }
            Operator::Cast => {
                let ty = self.expect_type(rhs, "cast")?;
                self.cast_value(lhs, ty)
            }
            Operator::Like => {
                let ty = self.expect_type(rhs, "like")?;
                Ok(Value::Boolean(self.is_like(lhs, ty)?))
            }
            other => Err(internal(&format!(
                "{:?} is not binary",
                other
            ))),
        }
    }

    fn overloaded(
        &mut self,
        op: Operator,
        lhs: &Value,
        rhs: Option<&Value>,
    ) -> VmResult<Option<Value>> {
        if !op.overloadable() {
            return Ok(None);
        }
        for operand in std::iter::once(lhs).chain(rhs) {
            if let Value::Object(obj) = operand {
                let helpers = self.obj(*obj)?.helpers.clone();
                if let Some(result) = helpers.invoke_operator(self, op, lhs, rhs)? {
                    return Ok(Some(result));
                }
            }
        }
        Ok(None)
    }

    fn add(&mut self, lhs: &Value, rhs: &Value) -> VmResult<Value> {
        let a = self.to_primitive(lhs)?;
        let b = self.to_primitive(rhs)?;
        if matches!(a, Value::String(_)) || matches!(b, Value::String(_)) {
            let left = self.to_string_value(&a)?;
            let right = self.to_string_value(&b)?;
            let mut joined = String::with_capacity(left.len() + right.len());
            joined.push_str(&left);
            joined.push_str(&right);
            return Ok(Value::from(joined));
        }
        Ok(Value::Number(a.to_number() + b.to_number()))
    }

    fn compare(&mut self, lhs: &Value, rhs: &Value) -> VmResult<Option<Ordering>> {
        let a = self.to_primitive(lhs)?;
        let b = self.to_primitive(rhs)?;
        if let (Value::String(a), Value::String(b)) = (&a, &b) {
            return Ok(Some(a.cmp(b)));
        }
        Ok(a.to_number().partial_cmp(&b.to_number()))
    }

    /// The `==` relation.
    pub fn loose_equals(&mut self, lhs: &Value, rhs: &Value) -> VmResult<bool> {
        Ok(match (lhs, rhs) {
            (a, b) if a.is_nullish() || b.is_nullish() => a.is_nullish() && b.is_nullish(),
            (Value::Object(a), Value::Object(b)) => a == b,
            (Value::Object(_), _) => {
                let primitive = self.to_primitive(lhs)?;
                return self.loose_equals(&primitive, rhs);
            }
            (_, Value::Object(_)) => {
                let primitive = self.to_primitive(rhs)?;
                return self.loose_equals(lhs, &primitive);
            }
            (Value::String(a), Value::String(b)) => a == b,
            (a, b) if a.type_of() == b.type_of() => a == b,
            (a, b) => a.to_number() == b.to_number(),
        })
    }

    fn expect_type(&mut self, value: &Value, operator: &str) -> VmResult<GcRef> {
        if let Value::Object(r) = value {
            if self.type_data(*r).is_some() {
                return Ok(*r);
            }
        }
        self.throw(
            ErrorKind::TypeError,
            format!("right-hand side of {} is not a type", operator),
        )
    }

    /// True if `value` is an instance of `ty`, or has every named instance
    /// property and method `ty` declares.
    pub fn is_like(&mut self, value: &Value, ty: GcRef) -> VmResult<bool> {
        if value.is_nullish() {
            return Ok(false);
        }
        if self.instance_of(value, ty) {
            return Ok(true);
        }
        let Value::Object(obj) = value else {
            return Ok(false);
        };
        let mut required: Vec<QualifiedName> = Vec::new();
        if let Some(block) = self.type_data(ty).and_then(|data| data.instance_block) {
            required.extend(self.obj(block)?.props.named_slots().map(|(_, n)| n.clone()));
        }
        let cell = self.obj(ty)?;
        for (slot, name) in cell.props.named_slots() {
            let is_static = cell
                .props
                .trait_at(slot)
                .is_some_and(|t| t.attributes.contains(Attributes::STATIC));
            let is_constructor = cell
                .props
                .get(slot)
                .and_then(Value::as_object)
                .and_then(|f| self.heap.get(f))
                .and_then(Obj::as_function)
                .is_some_and(FunctionData::is_constructor);
            if !is_static && !is_constructor {
                required.push(name.clone());
            }
        }

        let helpers = self.obj(*obj)?.helpers.clone();
        let own_type = self.type_of_value(value);
        for name in &required {
            let own = helpers.lookup_property(self, *obj, name)?.is_some();
            if !own && self.find_in_type_chain(own_type, name)?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Converts an object to a primitive: its `valueOf` result when that is
    /// primitive, otherwise its string form. Primitives pass unchanged.
    pub fn to_primitive(&mut self, value: &Value) -> VmResult<Value> {
        let Value::Object(obj) = value else {
            return Ok(value.clone());
        };
        if !matches!(self.obj(*obj)?.kind, ObjKind::Object | ObjKind::Block) {
            return Ok(Value::String(self.to_string_value(value)?));
        }
        if let Some(result) = self.call_member(value, "valueOf")? {
            if !matches!(result, Value::Object(_)) {
                return Ok(result);
            }
        }
        Ok(Value::String(self.to_string_value(value)?))
    }

    /// Calls a public method of `value` by name, if it has one.
    pub(crate) fn call_member(&mut self, value: &Value, name: &str) -> VmResult<Option<Value>> {
        let member = self.get_property(value, &QualifiedName::public(name))?;
        let callable = match &member {
            Value::Object(f) => self.obj(*f)?.as_function().is_some(),
            _ => false,
        };
        if !callable {
            return Ok(None);
        }
        self.call_function(&member, value.clone(), &[]).map(Some)
    }

    /// Numeric conversion.
    pub fn to_number_value(&mut self, value: &Value) -> VmResult<f64> {
        match value {
            Value::Object(_) => Ok(self.to_primitive(value)?.to_number()),
            other => Ok(other.to_number()),
        }
    }

    /// String conversion as scripts see it.
    ///
    /// Errors print as `Kind: message`, arrays join their elements with
    /// commas, and other objects use their `toString` method when they have
    /// one.
    pub fn to_string_value(&mut self, value: &Value) -> VmResult<Arc<str>> {
        let mut visiting = Vec::new();
        self.stringify(value, &mut visiting)
    }

    fn stringify(&mut self, value: &Value, visiting: &mut Vec<GcRef>) -> VmResult<Arc<str>> {
        let obj = match value {
            Value::String(text) => return Ok(text.clone()),
            Value::Object(obj) => *obj,
            other => return Ok(Arc::from(other.to_string())),
        };
        if visiting.contains(&obj) {
            return Ok(Arc::from(""));
        }
        let cell = self.obj(obj)?;
        let ty = cell.ty;
        let text = match &cell.kind {
            ObjKind::Type(data) => format!("[type {}]", data.qname),
            ObjKind::Function(data) => format!("[function {}]", data.name),
            ObjKind::Array(elements) => {
                let elements = elements.clone();
                visiting.push(obj);
                let mut parts = Vec::with_capacity(elements.len());
                for element in &elements {
                    if element.is_nullish() {
                        parts.push(Arc::from(""));
                    } else {
                        parts.push(self.stringify(element, visiting)?);
                    }
                }
                visiting.pop();
                parts.join(",")
            }
            ObjKind::Error(_) => {
                let kind = self.type_name(ty);
                let message = self.get_named(obj, "message")?;
                match message {
                    Value::Undefined | Value::Null => kind,
                    Value::String(text) if text.is_empty() => kind,
                    message => {
                        visiting.push(obj);
                        let message = self.stringify(&message, visiting)?;
                        visiting.pop();
                        format!("{}: {}", kind, message)
                    }
                }
            }
            ObjKind::Object | ObjKind::Block => {
                visiting.push(obj);
                let custom = self.call_member(value, "toString")?;
                visiting.pop();
                match custom {
                    Some(result @ (Value::String(_) | Value::Number(_) | Value::Boolean(_))) => {
                        return self.stringify(&result, visiting)
                    }
                    _ => format!("[object {}]", self.type_name(ty)),
                }
            }
        };
        Ok(Arc::from(text))
    }
}
