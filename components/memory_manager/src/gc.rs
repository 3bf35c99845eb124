//! Mark/sweep collection of a generation and everything younger.
//!
//! Collecting generation `G`:
//!
//! 1. Mark from the caller's roots, the permanent cells and every cell in
//!    the root logs of generations `<= G`. Marking does not descend into
//!    cells older than `G`, except logged cells, which are traced in full.
//! 2. Sweep generations `G` down to new. Unmarked cells are finalized and
//!    removed. A survivor that already survived once moves to the next
//!    older generation; otherwise it is flagged as a survivor.
//! 3. Compact the root logs of the collected generations and log the
//!    outgoing edges of promoted cells. A full collection rebuilds all logs.

use crate::config::GcMode;
use crate::generation::Generation;
use crate::heap::Heap;
use crate::trace::{Trace, Tracer};
use core_types::GcRef;
use rustc_hash::FxHashSet;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Memory situation observed after a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryPressure {
    /// Below the low-memory mark
    Normal,
    /// Above the low-memory mark, below the red line
    LowMemory,
    /// Crossed the red line and recovered by escalating to a full collection
    Escalated,
    /// Still above the red line after a full collection; the heap now
    /// refuses allocation
    Degraded,
}

/// Outcome of one call to [`Heap::collect`].
#[derive(Debug, Clone)]
pub struct GcReport {
    /// Oldest generation collected
    pub generation: Generation,
    /// Cells reclaimed
    pub reclaimed: usize,
    /// Cells promoted
    pub promoted: usize,
    /// Live cells afterwards
    pub live: usize,
    /// Time spent
    pub pause: Duration,
    /// Memory situation afterwards
    pub pressure: MemoryPressure,
}

struct SweepOutcome {
    reclaimed: usize,
    promoted: Vec<GcRef>,
}

impl<T: Trace> Heap<T> {
    /// Runs a collection chosen by `mode`.
    ///
    /// `roots` are the owner's roots (globals, stack, frames). Permanent
    /// cells and root-log entries are added by the heap.
    pub fn collect(&mut self, roots: &[GcRef], mode: GcMode) -> GcReport {
        let generation = self.select_generation(mode);
        let mut report = self.collect_generation(roots, generation);

        let live_bytes = self.live_bytes();
        if live_bytes > self.config.red_line {
            if report.generation < Generation::OLD {
                warn!(
                    target: "ejs::gc",
                    live_bytes,
                    red_line = self.config.red_line,
                    "red line crossed, escalating to a full collection"
                );
                let full = self.collect_generation(roots, Generation::OLD);
                report = GcReport {
                    generation: Generation::OLD,
                    reclaimed: report.reclaimed + full.reclaimed,
                    promoted: report.promoted + full.promoted,
                    live: full.live,
                    pause: report.pause + full.pause,
                    pressure: full.pressure,
                };
            }
            if self.live_bytes() > self.config.red_line {
                error!(
                    target: "ejs::gc",
                    live_bytes = self.live_bytes(),
                    "heap still above the red line after a full collection, entering degraded mode"
                );
                self.degraded = true;
                report.pressure = MemoryPressure::Degraded;
            } else {
                report.pressure = MemoryPressure::Escalated;
            }
        } else if live_bytes > self.config.low_memory {
            report.pressure = MemoryPressure::LowMemory;
        }
        report
    }

    /// Picks the generation a collection in `mode` would sweep.
    pub fn select_generation(&self, mode: GcMode) -> Generation {
        if self.full_required {
            return Generation::OLD;
        }
        match mode {
            GcMode::Quick => Generation::NEW,
            GcMode::Full => Generation::OLD,
            GcMode::Smart => [Generation::OLD, Generation::YOUNG]
                .into_iter()
                .find(|g| self.spaces[g.index()].allocated > self.config.work_quota)
                .unwrap_or(Generation::NEW),
        }
    }

    /// Collects `max` and every younger generation.
    pub fn collect_generation(&mut self, roots: &[GcRef], max: Generation) -> GcReport {
        let max = max.min(Generation::OLD);
        let started = Instant::now();
        debug!(target: "ejs::gc", generation = %max, live = self.cells.len(), "collection start");

        self.mark(roots, max);
        let outcome = self.sweep(max);

        if max == Generation::OLD {
            self.rebuild_root_logs();
        } else {
            self.compact_root_logs(max);
            for &r in &outcome.promoted {
                self.record_links(r);
            }
        }

        self.work_done = 0;
        self.collection_requested = false;
        let pause = started.elapsed();
        self.stats.collections += 1;
        self.stats.reclaimed += outcome.reclaimed as u64;
        self.stats.promoted += outcome.promoted.len() as u64;
        self.stats.last_pause = pause;
        self.stats.total_pause += pause;

        debug!(
            target: "ejs::gc",
            generation = %max,
            reclaimed = outcome.reclaimed,
            promoted = outcome.promoted.len(),
            live = self.cells.len(),
            pause_us = pause.as_micros() as u64,
            "collection finished"
        );

        GcReport {
            generation: max,
            reclaimed: outcome.reclaimed,
            promoted: outcome.promoted.len(),
            live: self.cells.len(),
            pause,
            pressure: MemoryPressure::Normal,
        }
    }

    fn mark(&mut self, roots: &[GcRef], max: Generation) {
        // (cell, trace even if older than max)
        let mut work: Vec<(GcRef, bool)> = roots.iter().map(|&r| (r, false)).collect();
        work.extend(self.permanent.iter().map(|&r| (r, true)));
        for log in self.root_logs.iter().take(max.index() + 1) {
            work.extend(log.entries().iter().map(|&r| (r, true)));
        }

        let mut forced: FxHashSet<GcRef> = FxHashSet::default();
        let mut tracer = Tracer::new();
        while let Some((r, force)) = work.pop() {
            let Some(cell) = self.cells.get_mut(r) else {
                continue;
            };
            if cell.header.generation > max {
                if !force || !forced.insert(r) {
                    continue;
                }
            } else {
                if cell.header.marked {
                    continue;
                }
                cell.header.marked = true;
            }
            cell.value.trace(&mut tracer);
            work.extend(tracer.take().into_iter().map(|child| (child, false)));
        }
    }

    fn sweep(&mut self, max: Generation) -> SweepOutcome {
        let mut outcome = SweepOutcome {
            reclaimed: 0,
            promoted: Vec::new(),
        };

        for index in (0..=max.index()).rev() {
            let generation = Generation::ALL[index];
            let promote_to = generation.older().filter(|g| g.is_collectable());
            let members = std::mem::take(&mut self.spaces[index].members);
            let mut kept = Vec::with_capacity(members.len());
            let mut bytes = 0;

            for r in members {
                let Some(cell) = self.cells.get_mut(r) else {
                    continue;
                };
                if !cell.header.marked && !cell.header.permanent {
                    if cell.value.has_finalizer() {
                        cell.value.finalize();
                    }
                    self.cells.remove(r);
                    outcome.reclaimed += 1;
                    continue;
                }
                cell.header.marked = false;
                let size = cell.value.size_hint();
                match promote_to {
                    Some(older) if cell.header.survived => {
                        cell.header.survived = false;
                        cell.header.generation = older;
                        let space = &mut self.spaces[older.index()];
                        space.members.push(r);
                        space.allocated += 1;
                        space.bytes += size;
                        outcome.promoted.push(r);
                    }
                    Some(_) => {
                        cell.header.survived = true;
                        kept.push(r);
                        bytes += size;
                    }
                    None => {
                        kept.push(r);
                        bytes += size;
                    }
                }
            }

            let space = &mut self.spaces[index];
            space.members = kept;
            space.bytes = bytes;
            space.allocated = 0;
        }
        outcome
    }
}
