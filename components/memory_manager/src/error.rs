use thiserror::Error;

/// Errors reported by the managed heap.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GcError {
    /// The heap passed its red line even after a full collection and no
    /// longer accepts allocations.
    #[error("heap is degraded: live memory above the red line after a full collection")]
    Degraded,
    /// A handle referred to a cell that has already been reclaimed.
    #[error("stale heap reference")]
    StaleReference,
}
