//! Calling conventions.
//!
//! Script calls push a [`Frame`] and return to the dispatch loop; native
//! calls run to completion on the Rust stack. Host code and natives that
//! need a result use [`Interpreter::call_function`], which runs a nested
//! dispatch loop until the pushed frame returns.

use crate::block::FrameId;
use crate::call_frame::Frame;
use crate::error::{VmError, VmResult};
use crate::function::{FunctionBody, FunctionData, FunctionFlags};
use crate::object::ObjKind;
use crate::types::{TypeFlags, TypeState};
use crate::vm::Interpreter;
use core_types::{ErrorKind, GcRef, JsError, QualifiedName, Value};
use tracing::debug;

/// What [`Interpreter::invoke`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    /// A script frame was pushed; the dispatch loop runs it
    Pushed,
    /// The call finished with this value
    Returned(Value),
}

impl Interpreter {
    /// Calls `callee` with `this` and `args` and waits for the result.
    ///
    /// Calling a type casts the first argument to it.
    ///
    /// Each call nests a dispatch loop on the Rust stack. More than
    /// `max_native_depth` nested calls is a fatal error.
    pub fn call_function(&mut self, callee: &Value, this: Value, args: &[Value]) -> VmResult<Value> {
        if self.native_depth >= self.config.max_native_depth {
            return Err(VmError::Fatal(JsError::new(
                ErrorKind::InternalError,
                format!(
                    "native call depth limit of {} exceeded",
                    self.config.max_native_depth
                ),
            )));
        }
        self.native_depth += 1;
        let result = match self.invoke(callee, this, args.to_vec(), true) {
            Ok(CallOutcome::Returned(value)) => Ok(value),
            Ok(CallOutcome::Pushed) => self.run(),
            Err(error) => Err(error),
        };
        self.native_depth -= 1;
        result
    }

    /// Calls the method `name` of `receiver`.
    pub fn call_method(&mut self, receiver: &Value, name: &str, args: &[Value]) -> VmResult<Value> {
        let method = self.get_property(receiver, &QualifiedName::public(name))?;
        self.call_function(&method, receiver.clone(), args)
    }

    /// Starts a call. `entry` marks a script frame whose return leaves the
    /// dispatch loop.
    pub(crate) fn invoke(
        &mut self,
        callee: &Value,
        this: Value,
        args: Vec<Value>,
        entry: bool,
    ) -> VmResult<CallOutcome> {
        let function = match callee {
            Value::Object(r) => *r,
            Value::Undefined | Value::Null => {
                return self.throw(
                    ErrorKind::ReferenceError,
                    format!("cannot call {}", callee),
                )
            }
            other => {
                let kind = other.type_of();
                return self.throw(
                    ErrorKind::TypeError,
                    format!("a {} is not callable", kind),
                );
            }
        };

        let cell = self.obj(function)?;
        let data: FunctionData = match &cell.kind {
            ObjKind::Function(data) => (**data).clone(),
            ObjKind::Type(_) => {
                let value = args.into_iter().next().unwrap_or_default();
                return self.cast_value(&value, function).map(CallOutcome::Returned);
            }
            _ => {
                let name = self.type_name(cell.ty);
                return self.throw(
                    ErrorKind::TypeError,
                    format!("{} object is not a function", name),
                );
            }
        };
        let scope = cell.block_data().map(|block| block.scope).unwrap_or_default();
        let this = data.bound_this.clone().unwrap_or(this);

        match &data.body {
            FunctionBody::Native(native) => {
                let native = *native;
                let mark = self.root_mark();
                self.root(callee.clone());
                self.root(this.clone());
                for arg in &args {
                    self.root(arg.clone());
                }
                let result = native(self, &this, &args);
                self.unroot_to(mark);
                let value = self.coerce(result?, data.return_type)?;
                Ok(CallOutcome::Returned(value))
            }
            FunctionBody::Declared => self.throw(
                ErrorKind::TypeError,
                format!("native function '{}' is not bound", data.name),
            ),
            FunctionBody::Script(code) => {
                if self.frames.len() >= self.config.max_call_depth {
                    return Err(VmError::Fatal(JsError::new(
                        ErrorKind::InternalError,
                        format!("call depth limit of {} exceeded", self.config.max_call_depth),
                    )));
                }
                let locals = self.prepare_args(&data, args)?;
                self.frame_serial += 1;
                let id = FrameId {
                    depth: self.frames.len() as u32,
                    serial: self.frame_serial,
                };
                let mut frame = Frame::new(
                    id,
                    function,
                    code.clone(),
                    this,
                    locals,
                    scope,
                    self.stack.len(),
                );
                frame.entry = entry;
                self.frames.push(frame);
                Ok(CallOutcome::Pushed)
            }
        }
    }

    /// Builds the activation of a script call from the actual arguments.
    ///
    /// Legacy functions pad missing arguments with undefined and drop
    /// extras. Otherwise the count must lie between the required and the
    /// declared parameters, unless a rest parameter collects the extras.
    /// Typed parameters are cast.
    pub(crate) fn prepare_args(
        &mut self,
        data: &FunctionData,
        args: Vec<Value>,
    ) -> VmResult<Vec<Value>> {
        let legacy = data.flags.contains(FunctionFlags::LEGACY_ARGS) || self.config.legacy_args;
        let rest = data.flags.contains(FunctionFlags::REST_ARGS);
        let declared = data.num_args as usize;
        let required = data.min_args() as usize;
        let given = args.len();

        if !legacy && given < required {
            return self.throw(
                ErrorKind::ArgError,
                format!(
                    "{} expects at least {} arguments, got {}",
                    data.name, required, given
                ),
            );
        }
        if !legacy && !rest && given > declared {
            return self.throw(
                ErrorKind::ArgError,
                format!(
                    "{} expects at most {} arguments, got {}",
                    data.name, declared, given
                ),
            );
        }

        let mut locals = vec![Value::Undefined; data.activation_size().max(declared)];
        let mut extras = Vec::new();
        for (index, arg) in args.into_iter().enumerate() {
            if index < declared {
                let ty = data.arg_types.get(index).copied().flatten();
                locals[index] = self.coerce(arg, ty)?;
            } else if rest {
                extras.push(arg);
            }
        }
        if rest {
            let array = self.new_array(extras)?;
            locals[declared] = Value::Object(array);
        }
        Ok(locals)
    }

    /// Creates an instance of `ty` and runs its constructor chain.
    pub fn construct(&mut self, ty: GcRef, args: &[Value]) -> VmResult<Value> {
        let Some(data) = self.type_data(ty) else {
            return self.throw(ErrorKind::TypeError, "only types can be constructed");
        };
        if data.flags.contains(TypeFlags::INTERFACE) {
            let name = self.type_name(ty);
            return self.throw(
                ErrorKind::TypeError,
                format!("cannot instantiate interface {}", name),
            );
        }
        let helpers = data.instance_helpers.clone();
        self.initialize_type(ty)?;

        let mark = self.root_mark();
        let result = helpers.create(self, ty).and_then(|obj| {
            self.root(Value::Object(obj));
            self.run_constructor(ty, obj, args).map(|_| Value::Object(obj))
        });
        self.unroot_to(mark);
        result
    }

    /// Runs the constructor of `ty` on `obj`.
    ///
    /// A type without its own constructor passes the arguments to its
    /// base. A constructor that does not chain explicitly gets its base
    /// constructors run first, without arguments.
    pub fn run_constructor(&mut self, ty: GcRef, obj: GcRef, args: &[Value]) -> VmResult<()> {
        let base = self.base_of(ty);
        let Some(ctor) = self.constructor_of(ty) else {
            return match base {
                Some(base) => self.run_constructor(base, obj, args),
                None => Ok(()),
            };
        };
        let calls_super = self
            .obj(ctor)?
            .as_function()
            .is_some_and(|data| data.flags.contains(FunctionFlags::CALLS_SUPER));
        if !calls_super {
            if let Some(base) = base {
                self.run_constructor(base, obj, &[])?;
            }
        }
        self.call_function(&Value::Object(ctor), Value::Object(obj), args)?;
        Ok(())
    }

    /// Runs the base constructor for the constructor in the top frame.
    pub(crate) fn super_call(&mut self, args: &[Value]) -> VmResult<()> {
        let Some(frame) = self.frames.last() else {
            return self.throw(ErrorKind::StateError, "super call outside a function");
        };
        if frame.super_called {
            return self.throw(
                ErrorKind::StateError,
                "base constructor was already called",
            );
        }
        let this = frame.this.clone();
        let owner = self
            .obj(frame.function)?
            .as_function()
            .filter(|data| data.is_constructor())
            .and_then(|data| data.owner);
        let (Some(owner), Value::Object(obj)) = (owner, this) else {
            return self.throw(ErrorKind::StateError, "super call outside a constructor");
        };
        if let Some(frame) = self.frames.last_mut() {
            frame.super_called = true;
        }
        match self.base_of(owner) {
            Some(base) => self.run_constructor(base, obj, args),
            None => Ok(()),
        }
    }

    /// Runs the static initializer of `ty` once, after its base's.
    pub fn initialize_type(&mut self, ty: GcRef) -> VmResult<()> {
        let Some(data) = self.type_data(ty) else {
            return Ok(());
        };
        if data.state != TypeState::TraitsFixedUp {
            return Ok(());
        }
        let initializer = data.initializer;
        if let Some(base) = data.base {
            self.initialize_type(base)?;
        }
        self.set_type_state(ty, TypeState::InitializerRun);
        if let Some(initializer) = initializer {
            debug!(target: "ejs::vm", ty = %self.type_name(ty), "running type initializer");
            if let Err(error) = self.call_function(&Value::Object(initializer), Value::Object(ty), &[]) {
                self.set_type_state(ty, TypeState::TraitsFixedUp);
                return Err(error);
            }
        }
        self.set_type_state(ty, TypeState::Ready);
        Ok(())
    }

    pub(crate) fn set_type_state(&mut self, ty: GcRef, state: TypeState) {
        if let Some(data) = self.type_data_mut(ty) {
            data.state = state;
        }
    }
}
