//! GC integration for interpreter objects
//!
//! Heap cells report their references through their helpers, and the
//! interpreter supplies the roots the heap cannot see: the evaluation
//! stack, live frames, pending exceptions and loader state.

use crate::context::HostEvent;
use crate::object::{Obj, ObjKind, Trait};
use crate::vm::Interpreter;
use core_types::{GcRef, Value};
use memory_manager::{GcMode, GcReport, MemoryPressure, Trace, Tracer};
use std::mem::size_of;
use tracing::{debug, error, warn};

impl Trace for Obj {
    fn trace(&self, tracer: &mut Tracer) {
        self.helpers.mark(self, tracer);
    }

    fn size_hint(&self) -> usize {
        let slots = self.props.len() * (size_of::<Value>() + size_of::<Trait>());
        let elements = match &self.kind {
            ObjKind::Array(elements) => elements.len() * size_of::<Value>(),
            _ => 0,
        };
        size_of::<Obj>() + slots + elements
    }

    fn has_finalizer(&self) -> bool {
        self.helpers.has_finalizer()
    }

    fn finalize(&mut self) {
        let helpers = self.helpers.clone();
        helpers.finalize(self);
    }
}

impl Interpreter {
    /// References the heap must treat as live.
    pub(crate) fn gather_roots(&self) -> Vec<GcRef> {
        let mut tracer = Tracer::new();
        tracer.edge(self.global);
        tracer.edge(self.memory_error);
        tracer.values(&self.stack);
        tracer.values(&self.temp_roots);
        if let Some(exception) = &self.exception {
            tracer.value(exception);
        }
        for frame in &self.frames {
            tracer.edge(frame.function);
            tracer.value(&frame.this);
            tracer.values(&frame.locals);
            tracer.optional(frame.scope.heap());
            for &block in frame.blocks.iter().chain(frame.needs_closure.iter()) {
                tracer.edge(block);
            }
            for completion in &frame.completions {
                if let Some(pending) = &completion.pending {
                    tracer.value(pending);
                }
            }
        }
        for event in &self.events {
            tracer.value(&event.callback);
            tracer.values(&event.args);
        }
        for initializer in &self.initializers {
            tracer.edge(initializer.target());
        }
        for &ty in &self.pending_types {
            tracer.edge(ty);
        }
        for fixup in &self.fixups {
            tracer.edge(fixup.holder());
        }
        tracer.edges().to_vec()
    }

    /// Collects garbage now, using `mode` to pick the generation.
    pub fn collect_garbage(&mut self, mode: GcMode) -> GcReport {
        let roots = self.gather_roots();
        let report = self.heap.collect(&roots, mode);
        self.report_pressure(&report);
        report
    }

    /// Runs the collection the heap requested, in the configured mode.
    pub(crate) fn collect_at_checkpoint(&mut self) {
        let mode = self.heap.config().mode;
        let report = self.collect_garbage(mode);
        debug!(
            target: "ejs::gc",
            generation = %report.generation,
            reclaimed = report.reclaimed,
            live = report.live,
            "checkpoint collection"
        );
    }

    fn report_pressure(&mut self, report: &GcReport) {
        match report.pressure {
            MemoryPressure::Normal => self.low_memory_reported = false,
            MemoryPressure::LowMemory | MemoryPressure::Escalated => {
                if !self.low_memory_reported {
                    self.low_memory_reported = true;
                    let live_bytes = self.heap.live_bytes();
                    warn!(target: "ejs::gc", live_bytes, "memory is low");
                    self.notify(HostEvent::LowMemory { live_bytes });
                }
            }
            MemoryPressure::Degraded => {
                error!(target: "ejs::gc", "heap degraded, allocations will fail");
                self.notify(HostEvent::Degraded);
            }
        }
    }
}
