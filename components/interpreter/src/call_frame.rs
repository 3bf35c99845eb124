//! Call frames.
//!
//! Frames are not heap objects. A frame's activation slots live in the
//! frame until it returns; if a closure captured the activation, it is
//! copied into a heap block first (see [`crate::closure`]).

use crate::block::{FrameId, ScopeLink};
use crate::function::ScriptCode;
use core_types::{GcRef, Value};
use std::sync::Arc;

/// Work a finally handler must resume when it ends.
#[derive(Debug, Clone)]
pub struct Completion {
    /// Exception masked by the finally handler, or `None` on the normal path
    pub pending: Option<Value>,
    /// First instruction of the handler
    pub handler_start: u32,
    /// One past the last instruction of the handler
    pub handler_end: u32,
}

/// One active script call.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Identity used by scope links into this frame
    pub id: FrameId,
    /// Function object being run
    pub function: GcRef,
    /// Its code
    pub code: Arc<ScriptCode>,
    /// Next instruction
    pub pc: usize,
    /// Receiver
    pub this: Value,
    /// Activation slots: parameters, rest array, locals
    pub locals: Vec<Value>,
    /// Scope the function closed over
    pub scope: ScopeLink,
    /// Lexical blocks opened by this frame, innermost last
    pub blocks: Vec<GcRef>,
    /// Evaluation stack height when the frame started
    pub stack_base: usize,
    /// Heap objects whose scope link names this frame
    pub needs_closure: Vec<GcRef>,
    /// Pending finally completions, innermost last
    pub completions: Vec<Completion>,
    /// Returning from this frame leaves the dispatch loop
    pub entry: bool,
    /// The base constructor has already run for this instance
    pub super_called: bool,
}

impl Frame {
    /// A frame about to run `function` from its first instruction.
    pub fn new(
        id: FrameId,
        function: GcRef,
        code: Arc<ScriptCode>,
        this: Value,
        locals: Vec<Value>,
        scope: ScopeLink,
        stack_base: usize,
    ) -> Self {
        Frame {
            id,
            function,
            code,
            pc: 0,
            this,
            locals,
            scope,
            blocks: Vec::new(),
            stack_base,
            needs_closure: Vec::new(),
            completions: Vec::new(),
            entry: false,
            super_called: false,
        }
    }

    /// Source line of the instruction last executed.
    pub fn line(&self) -> u32 {
        self.code.chunk.line_at(self.pc.saturating_sub(1))
    }

    /// The scope names resolve against first: the innermost block, or this
    /// frame's activation.
    pub fn innermost_scope(&self) -> ScopeLink {
        match self.blocks.last() {
            Some(&block) => ScopeLink::Heap(block),
            None => ScopeLink::Frame(self.id),
        }
    }
}
