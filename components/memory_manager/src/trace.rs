//! Tracing interface between the heap and the values it stores.

use core_types::{GcRef, Value};

/// A value that can live in the managed heap.
///
/// `trace` reports every heap reference the value holds. The collector
/// relies on it for marking and the write barrier relies on it to log the
/// edges of promoted objects.
pub trait Trace {
    /// Reports outgoing references to `tracer`.
    fn trace(&self, tracer: &mut Tracer);

    /// Approximate number of bytes owned by this value.
    fn size_hint(&self) -> usize {
        std::mem::size_of_val(self)
    }

    /// True if [`Trace::finalize`] must run before the value is destroyed.
    fn has_finalizer(&self) -> bool {
        false
    }

    /// Releases external resources. Called once, just before the cell is
    /// removed from the heap.
    fn finalize(&mut self) {}
}

/// Collects outgoing edges reported by [`Trace::trace`].
#[derive(Debug, Default)]
pub struct Tracer {
    edges: Vec<GcRef>,
}

impl Tracer {
    /// Creates an empty tracer.
    pub fn new() -> Self {
        Tracer::default()
    }

    /// Records a reference.
    pub fn edge(&mut self, r: GcRef) {
        self.edges.push(r);
    }

    /// Records the reference held by `value`, if any.
    pub fn value(&mut self, value: &Value) {
        if let Value::Object(r) = value {
            self.edges.push(*r);
        }
    }

    /// Records the references held by a run of values.
    pub fn values<'a>(&mut self, values: impl IntoIterator<Item = &'a Value>) {
        for value in values {
            self.value(value);
        }
    }

    /// Records an optional reference.
    pub fn optional(&mut self, r: Option<GcRef>) {
        if let Some(r) = r {
            self.edges.push(r);
        }
    }

    /// Edges recorded so far.
    pub fn edges(&self) -> &[GcRef] {
        &self.edges
    }

    pub(crate) fn take(&mut self) -> Vec<GcRef> {
        std::mem::take(&mut self.edges)
    }
}
