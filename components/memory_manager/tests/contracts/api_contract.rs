//! Contract tests verifying the memory_manager API.
//! These tests only use exported items and exercise whole collection cycles.

use core_types::{GcRef, Value};
use memory_manager::{
    GcConfig, GcError, GcMode, Generation, Heap, MemoryPressure, Trace, Tracer,
};

#[derive(Clone, Default)]
struct Cell {
    slots: Vec<Value>,
}

impl Trace for Cell {
    fn trace(&self, tracer: &mut Tracer) {
        tracer.values(&self.slots);
    }
}

fn store(heap: &mut Heap<Cell>, container: GcRef, value: Value) {
    heap.get_mut(container).unwrap().slots.push(value.clone());
    heap.write_barrier(container, &value);
}

/// Contract: a chain reachable from a root survives; a detached chain does not.
#[test]
fn contract_reachability() {
    let mut heap: Heap<Cell> = Heap::default();
    let root = heap.allocate(Cell::default()).unwrap();
    let a = heap.allocate(Cell::default()).unwrap();
    let b = heap.allocate(Cell::default()).unwrap();
    store(&mut heap, root, Value::Object(a));
    store(&mut heap, a, Value::Object(b));
    let lost = heap.allocate(Cell::default()).unwrap();

    heap.collect(&[root], GcMode::Full);
    assert!(heap.contains(a));
    assert!(heap.contains(b));
    assert!(!heap.contains(lost));
    assert!(heap.get(lost).is_none());
    assert_eq!(heap.try_get(lost).err(), Some(GcError::StaleReference));
}

/// Contract: collecting generation G never sweeps anything older than G.
#[test]
fn contract_older_generations_untouched() {
    let mut heap: Heap<Cell> = Heap::default();
    let old = heap.allocate_in(Generation::OLD, Cell::default()).unwrap();
    heap.collect(&[], GcMode::Quick);
    assert!(heap.contains(old));
    heap.collect(&[], GcMode::Full);
    assert!(!heap.contains(old));
}

/// Contract: eternal cells are never collected.
#[test]
fn contract_eternal_generation() {
    let mut heap: Heap<Cell> = Heap::default();
    let template = heap.allocate_in(Generation::ETERNAL, Cell::default()).unwrap();
    heap.collect(&[], GcMode::Full);
    assert!(heap.contains(template));
    assert_eq!(heap.generation_of(template), Some(Generation::ETERNAL));
}

/// Contract: every old-to-young edge created through the barrier keeps the
/// young referent alive across a young-only collection.
#[test]
fn contract_write_barrier_soundness() {
    let mut heap: Heap<Cell> = Heap::default();
    let old = heap.allocate_in(Generation::OLD, Cell::default()).unwrap();
    let mut young = Vec::new();
    for _ in 0..50 {
        let r = heap.allocate(Cell::default()).unwrap();
        store(&mut heap, old, Value::Object(r));
        young.push(r);
    }
    heap.collect(&[], GcMode::Quick);
    heap.collect(&[], GcMode::Quick);
    assert!(young.iter().all(|&r| heap.contains(r)));
}

/// Contract: a full collection after a root-log overflow keeps everything
/// reachable and rebuilds the log from the surviving holders.
#[test]
fn contract_root_log_overflow_recovery() {
    let mut heap: Heap<Cell> = Heap::default();
    let young = heap.allocate(Cell::default()).unwrap();
    let mut holders = Vec::new();
    for _ in 0..(memory_manager::ROOT_LOG_CAPACITY + 8) {
        let old = heap.allocate_in(Generation::OLD, Cell::default()).unwrap();
        store(&mut heap, old, Value::Object(young));
        holders.push(old);
    }
    assert!(heap.root_log(Generation::NEW).overflowed());

    // Smart mode is forced to a full collection by the overflow.
    assert_eq!(heap.select_generation(GcMode::Smart), Generation::OLD);
    let report = heap.collect(&holders[..4], GcMode::Smart);
    assert_eq!(report.generation, Generation::OLD);
    assert!(heap.contains(young));
    assert_eq!(heap.root_log(Generation::NEW).len(), 4);
    assert!(!heap.root_log(Generation::NEW).overflowed());
}

/// Contract: statistics track allocation, reclamation and promotion.
#[test]
fn contract_statistics() {
    let mut heap: Heap<Cell> = Heap::default();
    let root = heap.allocate(Cell::default()).unwrap();
    heap.allocate(Cell::default()).unwrap();
    heap.collect(&[root], GcMode::Quick);
    heap.collect(&[root], GcMode::Quick);
    let stats = heap.stats();
    assert_eq!(stats.allocations, 2);
    assert_eq!(stats.collections, 2);
    assert_eq!(stats.reclaimed, 1);
    assert_eq!(stats.promoted, 1);
    assert_eq!(stats.generations[Generation::YOUNG.index()].live, 1);
}

/// Contract: the low-memory mark is reported without degrading.
#[test]
fn contract_low_memory_pressure() {
    let mut heap: Heap<Cell> = Heap::new(GcConfig {
        low_memory: 1,
        ..GcConfig::default()
    });
    let root = heap.allocate(Cell::default()).unwrap();
    let report = heap.collect(&[root], GcMode::Quick);
    assert_eq!(report.pressure, MemoryPressure::LowMemory);
    assert!(!heap.is_degraded());
}

/// Contract: the heap can be cloned; the clone is independent.
#[test]
fn contract_clone_is_independent() {
    let mut heap: Heap<Cell> = Heap::default();
    let root = heap.allocate(Cell::default()).unwrap();
    let mut copy = heap.clone();
    store(&mut copy, root, Value::Number(1.0));
    assert!(heap.get(root).unwrap().slots.is_empty());
    assert_eq!(copy.get(root).unwrap().slots.len(), 1);
}
