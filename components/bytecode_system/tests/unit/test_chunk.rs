//! Tests for BytecodeChunk and CodeBuilder

use bytecode_system::{BytecodeChunk, CodeBuilder, HandlerKind, Opcode, TryRange, TypeRef};

#[test]
fn test_chunk_creation() {
    let chunk = BytecodeChunk::new();
    assert_eq!(chunk.instruction_count(), 0);
    assert!(chunk.handlers.is_empty());
}

#[test]
fn test_chunk_emit_instruction() {
    let mut chunk = BytecodeChunk::new();
    chunk.emit(Opcode::PushUndefined);
    assert_eq!(chunk.instruction_count(), 1);
    assert_eq!(chunk.opcode(0), Some(&Opcode::PushUndefined));
    assert_eq!(chunk.opcode(1), None);
}

#[test]
fn test_builder_backward_jump() {
    let mut code = CodeBuilder::new();
    let top = code.label_here();
    code.emit(Opcode::PushFalse).jump_if_true(top).emit(Opcode::Return);
    let chunk = code.finish().unwrap();
    assert_eq!(chunk.opcode(1), Some(&Opcode::JumpIfTrue(0)));
}

#[test]
fn test_builder_lines() {
    let mut code = CodeBuilder::new();
    code.line(10).emit(Opcode::PushNull).line(11).emit(Opcode::Throw);
    let chunk = code.finish().unwrap();
    assert_eq!(chunk.line_at(0), 10);
    assert_eq!(chunk.line_at(1), 11);
}

#[test]
fn test_builder_typed_catch_and_finally() {
    let mut code = CodeBuilder::new();
    let try_start = code.label_here();
    code.emit(Opcode::PushNull).emit(Opcode::Throw);
    let try_end = code.label_here();
    code.emit(Opcode::EndCatch);
    let catch_end = code.label_here();
    code.emit(Opcode::EndFinally);
    let finally_end = code.label_here();
    code.try_catch(
        TryRange {
            try_start,
            try_end,
            handler_start: try_end,
            handler_end: catch_end,
            block_depth: 0,
        },
        Some(TypeRef::named("TypeError")),
    );
    code.try_finally(TryRange {
        try_start,
        try_end: catch_end,
        handler_start: catch_end,
        handler_end: finally_end,
        block_depth: 0,
    });
    let chunk = code.finish().unwrap();
    assert_eq!(chunk.handlers.len(), 2);
    assert_eq!(chunk.handlers[0].kind, HandlerKind::Catch);
    assert_eq!(chunk.handlers[1].kind, HandlerKind::Finally);
    assert!(chunk.handlers[1].covers(2));
    assert!(chunk.validate(0).is_ok());
}
