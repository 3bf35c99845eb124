//! Exception delivery.
//!
//! A throw records the exception and raises the attention flag. At the
//! next checkpoint the dispatch loop searches the running function's
//! handler table for a range covering the faulting instruction; if none
//! matches, the frame is popped and the search continues in its caller.
//! An exception leaving an entry frame is returned to the Rust caller of
//! that dispatch loop.

use crate::block::BlockData;
use crate::call_frame::Completion;
use crate::context::Attention;
use crate::error::{VmError, VmResult};
use crate::object::{Obj, ObjKind};
use crate::vm::Interpreter;
use bytecode_system::{HandlerKind, ModuleError};
use core_types::{ErrorKind, GcRef, JsError, QualifiedName, StackFrame, Value};
use tracing::warn;

impl Interpreter {
    /// Records `value` as the pending exception.
    pub(crate) fn raise(&mut self, value: Value) {
        self.capture_backtrace(&value);
        self.exception = Some(value);
        self.attention = Attention::ExceptionPending;
    }

    /// Delivers the pending exception.
    ///
    /// Returns `Ok(None)` when a handler in a frame of this dispatch loop
    /// took it, and the exception when it escaped the entry frame.
    pub(crate) fn deliver_exception(&mut self) -> VmResult<Option<Value>> {
        let Some(value) = self.exception.take() else {
            return Ok(None);
        };
        loop {
            if self.frames.is_empty() {
                return Ok(Some(value));
            }
            if self.enter_handler(&value)? {
                return Ok(None);
            }
            let popped = self.pop_frame()?;
            if popped.entry {
                return Ok(Some(value));
            }
        }
    }

    /// Transfers control to the first handler of the top frame covering the
    /// faulting instruction and accepting `value`.
    fn enter_handler(&mut self, value: &Value) -> VmResult<bool> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(false);
        };
        let pc = frame.pc.saturating_sub(1) as u32;
        frame
            .completions
            .retain(|c| !(c.handler_start <= pc && pc < c.handler_end));
        let code = frame.code.clone();
        let function = frame.function;
        let catch_types = self
            .obj(function)?
            .as_function()
            .map(|data| data.catch_types.clone())
            .unwrap_or_default();

        let mut chosen = None;
        for (index, handler) in code.chunk.handlers.iter().enumerate() {
            if !handler.covers(pc) {
                continue;
            }
            let accepts = match handler.kind {
                HandlerKind::Finally => true,
                HandlerKind::Catch => match catch_types.get(index).copied().flatten() {
                    Some(ty) => self.instance_of(value, ty),
                    None => true,
                },
            };
            if accepts {
                chosen = Some(handler.clone());
                break;
            }
        }
        let Some(handler) = chosen else {
            return Ok(false);
        };

        let Some(stack_base) = self.frames.last().map(|f| f.stack_base) else {
            return Ok(false);
        };
        self.stack.truncate(stack_base);
        if let Some(frame) = self.frames.last_mut() {
            frame.blocks.truncate(handler.block_depth as usize);
            frame.pc = handler.handler_start as usize;
        }
        match handler.kind {
            HandlerKind::Catch => {
                self.open_catch_block(value.clone())?;
                if *value == Value::Object(self.memory_error) {
                    self.handling_memory_error = false;
                }
            }
            HandlerKind::Finally => {
                if let Some(frame) = self.frames.last_mut() {
                    frame.completions.push(Completion {
                        pending: Some(value.clone()),
                        handler_start: handler.handler_start,
                        handler_end: handler.handler_end,
                    });
                }
            }
        }
        Ok(true)
    }

    /// Pushes a block whose slot 0 holds the caught exception.
    fn open_catch_block(&mut self, value: Value) -> VmResult<()> {
        let Some(scope) = self.frames.last().map(|f| f.innermost_scope()) else {
            return Ok(());
        };
        let mut cell = Obj::block(
            self.core.block,
            self.helpers.object.clone(),
            1,
            BlockData::new(scope),
        );
        cell.props.set(Some(0), value);
        let block = self.allocate(cell)?;
        self.enter_block(block, scope);
        Ok(())
    }

    /// `EnterFinally`: runs a finally body on the normal path.
    pub(crate) fn enter_finally(&mut self) {
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        let start = frame.pc as u32;
        let end = frame
            .code
            .chunk
            .handlers
            .iter()
            .find(|h| h.kind == HandlerKind::Finally && h.handler_start == start)
            .map_or(frame.code.chunk.instruction_count() as u32, |h| h.handler_end);
        frame.completions.push(Completion {
            pending: None,
            handler_start: start,
            handler_end: end,
        });
    }

    /// `EndFinally`: resumes the exception the finally body masked, if any.
    pub(crate) fn end_finally(&mut self) -> VmResult<()> {
        let completion = self.frames.last_mut().and_then(|f| f.completions.pop());
        match completion.and_then(|c| c.pending) {
            Some(pending) => Err(VmError::Thrown(pending)),
            None => Ok(()),
        }
    }

    /// `EndCatch`: closes the catch block.
    pub(crate) fn end_catch(&mut self) {
        if let Some(frame) = self.frames.last_mut() {
            frame.blocks.pop();
        }
    }

    /// Records the current call stack in an error the first time it is
    /// thrown.
    fn capture_backtrace(&mut self, value: &Value) {
        let Value::Object(obj) = value else {
            return;
        };
        let captured = match self.heap.get(*obj).map(|cell| &cell.kind) {
            Some(ObjKind::Error(data)) => data.captured,
            _ => return,
        };
        if captured {
            return;
        }
        let backtrace = self.backtrace();
        let text = backtrace
            .iter()
            .map(|frame| format!("    at {}", frame))
            .collect::<Vec<_>>()
            .join("\n");
        if let Some(ObjKind::Error(data)) = self.heap.get_mut(*obj).map(|cell| &mut cell.kind) {
            data.backtrace = backtrace;
            data.captured = true;
        }
        let stack = QualifiedName::public("stack");
        let stored = self
            .lookup_own(*obj, &stack)
            .and_then(|slot| match slot {
                Some(slot) => self.store_slot(*obj, slot, Value::from(text)),
                None => Ok(()),
            });
        if let Err(error) = stored {
            warn!(target: "ejs::vm", %error, "cannot record error backtrace");
        }
    }

    /// Frames of the current call stack, innermost first.
    pub fn backtrace(&self) -> Vec<StackFrame> {
        self.frames
            .iter()
            .rev()
            .map(|frame| {
                let data = self.heap.get(frame.function).and_then(Obj::as_function);
                let name = data.map(|d| d.name.name.to_string()).unwrap_or_default();
                let mut entry = StackFrame::new(name);
                if let Some(owner) = data.and_then(|d| d.owner) {
                    entry = entry.with_owner(self.type_name(owner));
                }
                let line = frame.line();
                match &frame.code.file {
                    Some(file) => entry.with_location(file.to_string(), line),
                    None => {
                        entry.line = line;
                        entry
                    }
                }
            })
            .collect()
    }

    /// Describes an interpreter error for the host.
    ///
    /// Thrown core errors keep their kind; other thrown values, including
    /// instances of script-defined error types that do not derive from a
    /// core subtype, report `InternalError`.
    pub fn to_js_error(&mut self, error: &VmError) -> JsError {
        match error {
            VmError::Thrown(value) => self.exception_to_js_error(value),
            VmError::Fatal(error) => error.clone(),
            VmError::Cancelled => {
                JsError::new(ErrorKind::InternalError, "execution cancelled by the host")
            }
            VmError::Load(error) => {
                let kind = match error {
                    ModuleError::NotFound(_) | ModuleError::Io { .. } => ErrorKind::IOError,
                    ModuleError::Unresolved { .. } => ErrorKind::ReferenceError,
                    _ => ErrorKind::SyntaxError,
                };
                JsError::new(kind, error.to_string())
            }
        }
    }

    fn exception_to_js_error(&mut self, value: &Value) -> JsError {
        let Value::Object(obj) = value else {
            return JsError::new(ErrorKind::InternalError, format!("uncaught {}", value));
        };
        let Some(cell) = self.heap.get(*obj) else {
            return JsError::new(ErrorKind::InternalError, "uncaught stale object");
        };
        let ty = cell.ty;
        let backtrace = match &cell.kind {
            ObjKind::Error(data) => Some(data.backtrace.clone()),
            _ => None,
        };
        let message = match &backtrace {
            Some(_) => match self.get_named(*obj, "message") {
                Ok(Value::String(text)) => text.to_string(),
                Ok(other) if !other.is_nullish() => other.to_string(),
                _ => String::new(),
            },
            None => self
                .to_string_value(value)
                .map(|text| format!("uncaught {}", text))
                .unwrap_or_else(|_| "uncaught exception".to_string()),
        };
        let kind = self.nearest_error_kind(ty).unwrap_or(ErrorKind::InternalError);
        JsError::new(kind, message).with_stack(backtrace.unwrap_or_default())
    }

    fn nearest_error_kind(&self, ty: GcRef) -> Option<ErrorKind> {
        let mut current = Some(ty);
        while let Some(ty) = current {
            if let Some(kind) = self.core.error_kind(ty) {
                return Some(kind);
            }
            current = self.base_of(ty);
        }
        None
    }
}
