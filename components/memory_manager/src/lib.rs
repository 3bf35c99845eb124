//! Memory Manager - generational garbage collector and managed heap
//!
//! This component provides:
//! - An index-based heap of traceable cells addressed by [`GcRef`]
//! - Ordered generations (new, young, old, eternal) with promotion
//! - Per-generation root logs maintained by a write barrier
//! - Mark/sweep collection of a generation and everything younger
//! - Smart, quick and full triggering modes driven by a work quota
//! - Red-line escalation and a degraded mode that refuses allocation
//!
//! The heap does not know what it stores. Anything implementing [`Trace`]
//! can live in it; the interpreter stores its object cells here.
//!
//! [`GcRef`]: core_types::GcRef

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod gc;
pub mod generation;
pub mod heap;
pub mod trace;
pub mod write_barrier;

mod error;

pub use config::{GcConfig, GcMode};
pub use error::GcError;
pub use gc::{GcReport, MemoryPressure};
pub use generation::Generation;
pub use heap::{GcHeader, GcStats, GenerationStats, Heap};
pub use trace::{Trace, Tracer};
pub use write_barrier::{RootLog, ROOT_LOG_CAPACITY};
