//! Write barrier and per-generation root logs.
//!
//! When an object in an older generation is made to reference an object in
//! a younger one, the older object is recorded in the younger generation's
//! root log. Collecting that younger generation traces logged objects as
//! extra roots, so it never has to scan the older generations.
//!
//! Logs are bounded. An overflowing log forces the next collection to be
//! full; the full collection rebuilds every log from scratch.

use crate::generation::Generation;
use crate::heap::Heap;
use crate::trace::{Trace, Tracer};
use arrayvec::ArrayVec;
use core_types::{GcRef, Value};
use tracing::warn;

/// Capacity of each generation's root log.
pub const ROOT_LOG_CAPACITY: usize = 256;

/// Older objects known to reference a particular younger generation.
#[derive(Debug, Clone, Default)]
pub struct RootLog {
    entries: ArrayVec<GcRef, ROOT_LOG_CAPACITY>,
    overflowed: bool,
}

impl RootLog {
    /// Logged objects.
    pub fn entries(&self) -> &[GcRef] {
        &self.entries
    }

    /// Number of logged objects.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is logged.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if an entry was dropped since the log was last rebuilt.
    pub fn overflowed(&self) -> bool {
        self.overflowed
    }

    fn record(&mut self, r: GcRef) -> bool {
        if self.entries.try_push(r).is_err() {
            self.overflowed = true;
            return false;
        }
        true
    }

    fn drain(&mut self) -> Vec<GcRef> {
        self.overflowed = false;
        self.entries.drain(..).collect()
    }
}

impl<T: Trace> Heap<T> {
    /// Records that `container` now references whatever `value` holds.
    ///
    /// Must be called after every store of a reference into a heap cell.
    pub fn write_barrier(&mut self, container: GcRef, value: &Value) {
        if let Value::Object(target) = value {
            self.note_edge(container, *target);
        }
    }

    /// Records an edge from `container` to `target` if it crosses from an
    /// older generation into a younger one.
    pub fn note_edge(&mut self, container: GcRef, target: GcRef) {
        let Some(target_gen) = self.generation_of(target) else {
            return;
        };
        let Some(cell) = self.cells.get_mut(container) else {
            return;
        };
        if cell.header.generation <= target_gen {
            return;
        }
        let bit = target_gen.bit();
        if cell.header.ref_links & bit != 0 {
            return;
        }
        cell.header.ref_links |= bit;
        if !self.root_logs[target_gen.index()].record(container) {
            warn!(
                target: "ejs::gc",
                generation = %target_gen,
                "root log overflow, next collection will be full"
            );
            self.full_required = true;
        }
    }

    /// Re-examines every reference `container` holds. Used after bulk
    /// mutations such as copying a table into the cell.
    pub fn write_barrier_all(&mut self, container: GcRef) {
        self.record_links(container);
    }

    /// Root log of `generation`.
    pub fn root_log(&self, generation: Generation) -> &RootLog {
        &self.root_logs[generation.index()]
    }

    /// Logs every cross-generation edge held by `r`.
    pub(crate) fn record_links(&mut self, r: GcRef) {
        let mut tracer = Tracer::new();
        match self.cells.get(r) {
            Some(cell) => cell.value.trace(&mut tracer),
            None => return,
        }
        for target in tracer.take() {
            self.note_edge(r, target);
        }
    }

    /// Drops dead entries from the logs of collected generations and
    /// re-logs the survivors against their referents' new generations.
    pub(crate) fn compact_root_logs(&mut self, max: Generation) {
        let mut revisit = Vec::new();
        let mut cleared = 0u8;
        for generation in Generation::ALL.iter().take(max.index() + 1) {
            revisit.extend(self.root_logs[generation.index()].drain());
            cleared |= generation.bit();
        }
        for &r in &revisit {
            if let Some(cell) = self.cells.get_mut(r) {
                cell.header.ref_links &= !cleared;
            }
        }
        for r in revisit {
            self.record_links(r);
        }
    }

    /// Rebuilds every root log by walking all cells older than the new
    /// generation.
    pub(crate) fn rebuild_root_logs(&mut self) {
        for log in self.root_logs.iter_mut() {
            log.drain();
        }
        let older: Vec<GcRef> = self
            .spaces
            .iter()
            .skip(1)
            .flat_map(|space| space.members.iter().copied())
            .collect();
        for &r in &older {
            if let Some(cell) = self.cells.get_mut(r) {
                cell.header.ref_links = 0;
            }
        }
        for r in older {
            self.record_links(r);
        }
        self.full_required = false;
    }
}
