//! The embedding interface.
//!
//! Hosts create interpreters, load modules along the search path, run
//! initializers and call exported functions. Errors cross this boundary as
//! [`HostError`]; uncaught script exceptions are also reported to the host
//! callback.

use crate::context::{Attention, CancelHandle, HostEvent};
use crate::error::{HostError, VmError, VmResult};
use crate::function::{FunctionBody, NativeFn};
use crate::loader::Initializer;
use crate::vm::{Interpreter, PendingEvent};
use bytecode_system::{ModuleError, ModuleRecord};
use core_types::{ErrorKind, JsError, QualifiedName, Value};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, error};

impl Interpreter {
    /// Creates an interpreter sharing `master`'s loaded types and globals.
    ///
    /// The clone starts from a copy of the master's heap whose property
    /// tables stay shared until either side writes them, so globals the
    /// clone assigns never show up in the master. Module records are
    /// shared; stacks, frames, the host callback and the cancel handle are
    /// not.
    ///
    /// # Errors
    ///
    /// A master that is running script cannot be cloned.
    pub fn clone_of(master: &Interpreter) -> Result<Interpreter, HostError> {
        if !master.frames.is_empty() {
            return Err(HostError::Fatal(JsError::new(
                ErrorKind::StateError,
                "cannot clone an interpreter while it runs",
            )));
        }
        Ok(Interpreter {
            heap: master.heap.clone(),
            config: master.config.clone(),
            helpers: master.helpers.clone(),
            core: master.core,
            global: master.global,
            stack: Vec::with_capacity(256.min(master.config.stack_size)),
            frames: Vec::new(),
            frame_serial: 0,
            native_depth: 0,
            temp_roots: Vec::new(),
            exception: None,
            attention: Attention::None,
            cancel: CancelHandle::new(),
            registry: master.registry.clone(),
            loaded: master.loaded.clone(),
            loading: Vec::new(),
            fixups: Vec::new(),
            pending_types: Vec::new(),
            initializers: master.initializers.clone(),
            natives: master.natives.clone(),
            host_callback: None,
            events: VecDeque::new(),
            memory_error: master.memory_error,
            handling_memory_error: false,
            low_memory_reported: false,
        })
    }

    /// Loads module `name` and everything it depends on.
    ///
    /// Records are found as `<dir>/<name>.mod.json` along the configured
    /// search path, dependencies first. Mutually dependent modules load
    /// in one batch, so their forward type references resolve. Returns
    /// the modules this call loaded; already loaded modules are skipped.
    pub fn load_module(&mut self, name: &str) -> Result<Vec<String>, HostError> {
        let mut order = Vec::new();
        let depth = self.loading.len();
        let collected = self.collect_records(name, &mut order);
        self.loading.truncate(depth);
        collected?;
        if order.is_empty() {
            return Ok(Vec::new());
        }
        self.load_batch(&order).map_err(|e| self.host_error(e))
    }

    fn collect_records(
        &mut self,
        name: &str,
        order: &mut Vec<Arc<ModuleRecord>>,
    ) -> Result<(), ModuleError> {
        let queued = order
            .iter()
            .any(|record| record.module_names().any(|defined| defined == name));
        if self.loaded.contains(name) || queued || self.loading.iter().any(|n| n == name) {
            return Ok(());
        }
        let record = self.registry.find(name, &self.config.search_path)?;
        self.loading.push(name.to_string());
        for dependency in record.dependencies() {
            self.collect_records(&dependency, order)?;
        }
        self.loading.pop();
        if !order.iter().any(|queued| Arc::ptr_eq(queued, &record)) {
            order.push(record);
        }
        Ok(())
    }

    /// Loads an in-memory record. Its dependencies must already be loaded.
    pub fn load_record(&mut self, record: ModuleRecord) -> Result<Vec<String>, HostError> {
        let record = self.registry.insert(record);
        self.load_batch(&[record]).map_err(|e| self.host_error(e))
    }

    /// Runs queued module initializers and readies loaded types, in load
    /// order.
    pub fn run_initializers(&mut self) -> Result<(), HostError> {
        while let Some(initializer) = self.initializers.pop_front() {
            let result = match initializer {
                Initializer::Type(ty) => self.initialize_type(ty),
                Initializer::Module(function) => {
                    debug!(target: "ejs::vm", "running module initializer");
                    let global = Value::Object(self.global);
                    self.call_function(&Value::Object(function), global, &[])
                        .map(|_| ())
                }
            };
            result.map_err(|e| self.host_error(e))?;
        }
        Ok(())
    }

    /// Calls the global function `name` (`"space::name"` or a bare name)
    /// with `args`.
    pub fn run_function(&mut self, name: &str, args: &[Value]) -> Result<Value, HostError> {
        let result = self.call_global(name, args);
        result.map_err(|e| self.host_error(e))
    }

    fn call_global(&mut self, name: &str, args: &[Value]) -> VmResult<Value> {
        let global = self.global;
        let qname = QualifiedName::parse(name);
        let Some(slot) = self.lookup_own(global, &qname)? else {
            return self.throw(
                ErrorKind::ReferenceError,
                format!("'{}' is not defined", name),
            );
        };
        let function = self.get_slot(global, slot)?;
        if self.typeof_str(&function) != "function" {
            return self.throw(ErrorKind::TypeError, format!("'{}' is not a function", name));
        }
        self.call_function(&function, Value::Object(global), args)
    }

    /// Value of the global `name`, or `None` if there is no such global.
    pub fn global_value(&mut self, name: &str) -> Result<Option<Value>, HostError> {
        let global = self.global;
        let qname = QualifiedName::parse(name);
        let result = self.lookup_own(global, &qname).and_then(|slot| match slot {
            Some(slot) => self.get_slot(global, slot).map(Some),
            None => Ok(None),
        });
        result.map_err(|e| self.host_error(e))
    }

    /// Assigns the global `name`, defining it if needed.
    pub fn set_global(&mut self, name: &str, value: Value) -> Result<(), HostError> {
        let global = self.global;
        let qname = QualifiedName::parse(name);
        let result = self.set_property(&Value::Object(global), &qname, value);
        result.map_err(|e| self.host_error(e))
    }

    /// Registers a host implementation for native declarations named
    /// `name`: `Type.method` for members, the plain name for globals.
    ///
    /// Declarations loaded later bind to it when loaded. A global native
    /// declaration already loaded is bound now.
    pub fn register_native(&mut self, name: &str, native: NativeFn) {
        self.natives.insert(name.to_string(), native);
        if name.contains('.') {
            return;
        }
        let global = self.global;
        let slot = self
            .heap
            .get(global)
            .and_then(|cell| cell.props.lookup(&QualifiedName::public(name)));
        let function = slot.and_then(|slot| {
            self.heap
                .get(global)
                .and_then(|cell| cell.props.get(slot))
                .and_then(Value::as_object)
        });
        if let Some(data) = function
            .and_then(|f| self.heap.get_mut(f))
            .and_then(|cell| cell.as_function_mut())
        {
            if matches!(data.body, FunctionBody::Declared) {
                data.body = FunctionBody::Native(native);
            }
        }
    }

    /// Installs the callback receiving [`HostEvent`]s.
    pub fn set_host_callback(&mut self, callback: impl FnMut(HostEvent) + Send + 'static) {
        self.host_callback = Some(Box::new(callback));
    }

    /// A handle another thread can use to stop this interpreter.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Names of the loaded modules, sorted.
    pub fn loaded_modules(&self) -> Vec<String> {
        let mut names: Vec<String> = self.loaded.iter().cloned().collect();
        names.sort();
        names
    }

    /// Queues `callback` to be called with `args` by
    /// [`Interpreter::service_events`].
    pub fn post_event(&mut self, callback: Value, args: Vec<Value>) {
        self.events.push_back(PendingEvent { callback, args });
    }

    /// Calls queued event callbacks until the queue is empty and returns
    /// how many ran.
    ///
    /// Natives may call this while script is running; the callbacks then
    /// run on top of the current frames.
    pub fn service_events(&mut self) -> VmResult<usize> {
        let mut count = 0;
        while let Some(event) = self.events.pop_front() {
            self.call_function(&event.callback, Value::Undefined, &event.args)?;
            count += 1;
        }
        Ok(count)
    }

    /// Converts an interpreter error for the host. Uncaught exceptions are
    /// logged and reported to the host callback.
    pub fn host_error(&mut self, error: VmError) -> HostError {
        self.handling_memory_error = false;
        match error {
            VmError::Thrown(_) => {
                let js = self.to_js_error(&error);
                let report = js.backtrace_report();
                error!(target: "ejs::vm", kind = %js.kind, message = %js.message, "uncaught exception");
                self.notify(HostEvent::UncaughtException { report });
                HostError::Uncaught(js)
            }
            VmError::Fatal(js) => HostError::Fatal(js),
            VmError::Cancelled => HostError::Cancelled,
            VmError::Load(error) => HostError::Load(error),
        }
    }
}
