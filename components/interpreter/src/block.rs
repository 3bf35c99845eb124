//! Lexical scope data shared by blocks, types and functions.

use core_types::GcRef;
use std::sync::Arc;

/// Identifies a live call frame.
///
/// `depth` is the frame's index in the frame stack; `serial` tells apart
/// successive frames that occupied the same depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId {
    /// Index in the frame stack
    pub depth: u32,
    /// Unique per interpreter
    pub serial: u64,
}

/// Link from a scope to its lexically enclosing scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeLink {
    /// Outermost scope; lookups continue at the global object
    #[default]
    None,
    /// A heap block
    Heap(GcRef),
    /// The activation of a frame that has not returned yet
    Frame(FrameId),
}

impl ScopeLink {
    /// The heap block this link names, if any.
    pub fn heap(self) -> Option<GcRef> {
        match self {
            ScopeLink::Heap(r) => Some(r),
            _ => None,
        }
    }
}

/// Scope data of a block.
#[derive(Debug, Clone, Default)]
pub struct BlockData {
    /// Leading slots copied from a base block
    pub num_inherited: u32,
    /// Namespaces opened in this scope, innermost last
    pub namespaces: Vec<Arc<str>>,
    /// Enclosing scope
    pub scope: ScopeLink,
    /// Object whose properties a `with` block resolves names against
    pub with_target: Option<GcRef>,
}

impl BlockData {
    /// Block data linked to `scope`.
    pub fn new(scope: ScopeLink) -> Self {
        BlockData {
            scope,
            ..BlockData::default()
        }
    }

    /// Opens `space` in this scope.
    pub fn open_namespace(&mut self, space: &str) {
        if !self.namespaces.iter().any(|open| &**open == space) {
            self.namespaces.push(Arc::from(space));
        }
    }
}
