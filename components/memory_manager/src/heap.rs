//! The managed heap.
//!
//! Cells live in a slot map keyed by [`GcRef`]. Every cell carries a
//! [`GcHeader`] with its generation and collector flags; each generation
//! keeps the list of cells it owns so a collection only walks the
//! generations it sweeps.

use crate::config::GcConfig;
use crate::error::GcError;
use crate::generation::Generation;
use crate::trace::Trace;
use crate::write_barrier::RootLog;
use core_types::GcRef;
use rustc_hash::FxHashSet;
use slotmap::SlotMap;
use std::fmt;
use std::time::Duration;

/// Collector metadata stored alongside every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcHeader {
    /// Generation that currently owns the cell
    pub generation: Generation,
    /// Set during marking; cleared by the sweep
    pub marked: bool,
    /// Survived one collection of its generation; the next survival promotes
    pub survived: bool,
    /// Never swept, and treated as a root
    pub permanent: bool,
    /// Bit per younger generation whose root log already holds this cell
    pub ref_links: u8,
}

impl GcHeader {
    fn new(generation: Generation) -> Self {
        GcHeader {
            generation,
            marked: false,
            survived: false,
            permanent: false,
            ref_links: 0,
        }
    }
}

#[derive(Clone)]
pub(crate) struct Cell<T> {
    pub(crate) header: GcHeader,
    pub(crate) value: T,
}

/// Membership and accounting for one generation.
#[derive(Debug, Clone, Default)]
pub(crate) struct Space {
    pub(crate) members: Vec<GcRef>,
    /// Allocations (or promotions) into this generation since it was last
    /// collected.
    pub(crate) allocated: usize,
    pub(crate) bytes: usize,
}

/// Live count and byte estimate for one generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationStats {
    /// Cells owned by the generation
    pub live: usize,
    /// Estimated bytes owned by those cells
    pub bytes: usize,
}

/// Cumulative collector statistics.
#[derive(Debug, Clone, Default)]
pub struct GcStats {
    /// Collections run (an escalated collection counts twice)
    pub collections: u64,
    /// Cells allocated
    pub allocations: u64,
    /// Cells reclaimed
    pub reclaimed: u64,
    /// Cells promoted into an older generation
    pub promoted: u64,
    /// Pause of the most recent collection
    pub last_pause: Duration,
    /// Sum of all pauses
    pub total_pause: Duration,
    /// Per-generation snapshot, youngest first
    pub generations: [GenerationStats; Generation::COUNT],
}

/// A generational heap of traceable cells.
///
/// The heap never collects on its own. Allocation counts work and raises
/// [`Heap::collection_requested`] once the quota is used up; the owner
/// decides when it is safe to call [`Heap::collect`].
///
/// # Examples
///
/// ```
/// use memory_manager::{Generation, Heap, Trace, Tracer};
///
/// #[derive(Clone)]
/// struct Leaf(u32);
///
/// impl Trace for Leaf {
///     fn trace(&self, _tracer: &mut Tracer) {}
/// }
///
/// let mut heap: Heap<Leaf> = Heap::default();
/// let r = heap.allocate(Leaf(7)).unwrap();
/// assert_eq!(heap.get(r).map(|leaf| leaf.0), Some(7));
/// assert_eq!(heap.generation_of(r), Some(Generation::NEW));
/// ```
#[derive(Clone)]
pub struct Heap<T> {
    pub(crate) cells: SlotMap<GcRef, Cell<T>>,
    pub(crate) spaces: [Space; Generation::COUNT],
    pub(crate) root_logs: [RootLog; Generation::COUNT],
    pub(crate) permanent: FxHashSet<GcRef>,
    pub(crate) config: GcConfig,
    pub(crate) work_done: usize,
    pub(crate) collection_requested: bool,
    pub(crate) full_required: bool,
    pub(crate) degraded: bool,
    pub(crate) stats: GcStats,
}

impl<T: Trace> Default for Heap<T> {
    fn default() -> Self {
        Heap::new(GcConfig::default())
    }
}

impl<T> fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap")
            .field("live", &self.cells.len())
            .field("work_done", &self.work_done)
            .field("collection_requested", &self.collection_requested)
            .field("degraded", &self.degraded)
            .finish()
    }
}

impl<T: Trace> Heap<T> {
    /// Creates an empty heap.
    pub fn new(config: GcConfig) -> Self {
        Heap {
            cells: SlotMap::with_key(),
            spaces: Default::default(),
            root_logs: Default::default(),
            permanent: FxHashSet::default(),
            config,
            work_done: 0,
            collection_requested: false,
            full_required: false,
            degraded: false,
            stats: GcStats::default(),
        }
    }

    /// Allocates a cell in the new generation.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::Degraded`] once the heap has entered degraded mode.
    pub fn allocate(&mut self, value: T) -> Result<GcRef, GcError> {
        self.allocate_in(Generation::NEW, value)
    }

    /// Allocates a cell directly into `generation`.
    ///
    /// Cells placed in an older generation have their initial edges logged
    /// so younger referents stay reachable.
    pub fn allocate_in(&mut self, generation: Generation, value: T) -> Result<GcRef, GcError> {
        self.allocate_with(generation, |_| value)
    }

    /// Allocates a cell whose contents need to know their own handle.
    pub fn allocate_with(
        &mut self,
        generation: Generation,
        make: impl FnOnce(GcRef) -> T,
    ) -> Result<GcRef, GcError> {
        if self.degraded {
            return Err(GcError::Degraded);
        }
        let r = self.cells.insert_with_key(|key| Cell {
            header: GcHeader::new(generation),
            value: make(key),
        });
        let size = self.cells.get(r).map_or(0, |cell| cell.value.size_hint());
        let space = &mut self.spaces[generation.index()];
        space.members.push(r);
        space.allocated += 1;
        space.bytes += size;
        self.stats.allocations += 1;

        if generation > Generation::NEW {
            self.record_links(r);
        }
        if generation.is_collectable() && self.config.enabled {
            self.work_done += 1;
            if self.work_done >= self.config.work_quota {
                self.collection_requested = true;
            }
        }
        Ok(r)
    }

    /// Charges `bytes` of growth of the live cell `r` to its generation.
    ///
    /// The estimate is recomputed from the cells at the next sweep. Growth
    /// that takes the heap past its red line requests a collection.
    ///
    /// # Errors
    ///
    /// Returns [`GcError::Degraded`] once the heap has entered degraded mode.
    pub fn charge(&mut self, r: GcRef, bytes: usize) -> Result<(), GcError> {
        if self.degraded {
            return Err(GcError::Degraded);
        }
        if let Some(generation) = self.generation_of(r) {
            let space = &mut self.spaces[generation.index()];
            space.bytes = space.bytes.saturating_add(bytes);
        }
        if self.live_bytes() > self.config.red_line {
            self.collection_requested = true;
        }
        Ok(())
    }

    /// Borrows a live cell.
    pub fn get(&self, r: GcRef) -> Option<&T> {
        self.cells.get(r).map(|cell| &cell.value)
    }

    /// Mutably borrows a live cell.
    ///
    /// Callers that store a reference into the cell must follow up with
    /// [`Heap::write_barrier`].
    pub fn get_mut(&mut self, r: GcRef) -> Option<&mut T> {
        self.cells.get_mut(r).map(|cell| &mut cell.value)
    }

    /// Borrows a live cell or reports a stale handle.
    pub fn try_get(&self, r: GcRef) -> Result<&T, GcError> {
        self.get(r).ok_or(GcError::StaleReference)
    }

    /// True if `r` still names a live cell.
    pub fn contains(&self, r: GcRef) -> bool {
        self.cells.contains_key(r)
    }

    /// Collector metadata of a live cell.
    pub fn header(&self, r: GcRef) -> Option<&GcHeader> {
        self.cells.get(r).map(|cell| &cell.header)
    }

    /// Generation currently owning `r`.
    pub fn generation_of(&self, r: GcRef) -> Option<Generation> {
        self.header(r).map(|header| header.generation)
    }

    /// Marks or unmarks a cell as permanent. Permanent cells are roots and
    /// are never swept.
    pub fn make_permanent(&mut self, r: GcRef, permanent: bool) {
        if let Some(cell) = self.cells.get_mut(r) {
            cell.header.permanent = permanent;
            if permanent {
                self.permanent.insert(r);
            } else {
                self.permanent.remove(&r);
            }
        }
    }

    /// True if `r` is permanent.
    pub fn is_permanent(&self, r: GcRef) -> bool {
        self.header(r).is_some_and(|header| header.permanent)
    }

    /// Number of live cells.
    pub fn live_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of live cells owned by `generation`.
    pub fn generation_count(&self, generation: Generation) -> usize {
        self.spaces[generation.index()].members.len()
    }

    /// Estimated live bytes across all generations.
    pub fn live_bytes(&self) -> usize {
        self.spaces.iter().map(|space| space.bytes).sum()
    }

    /// Iterates over live cells.
    pub fn iter(&self) -> impl Iterator<Item = (GcRef, &T)> {
        self.cells.iter().map(|(r, cell)| (r, &cell.value))
    }

    /// True once the allocation quota has been used up.
    pub fn collection_requested(&self) -> bool {
        self.collection_requested
    }

    /// Asks the owner to collect at its next safe point.
    pub fn request_collection(&mut self) {
        self.collection_requested = true;
    }

    /// True once the heap refuses allocation.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Leaves degraded mode. Hosts call this after releasing memory.
    pub fn clear_degraded(&mut self) {
        self.degraded = false;
    }

    /// Active configuration.
    pub fn config(&self) -> &GcConfig {
        &self.config
    }

    /// Mutable configuration.
    pub fn config_mut(&mut self) -> &mut GcConfig {
        &mut self.config
    }

    /// Snapshot of collector statistics.
    pub fn stats(&self) -> GcStats {
        let mut stats = self.stats.clone();
        for (slot, space) in stats.generations.iter_mut().zip(self.spaces.iter()) {
            *slot = GenerationStats {
                live: space.members.len(),
                bytes: space.bytes,
            };
        }
        stats
    }
}
