//! Bytecode chunk - a function's code
//!
//! Contains instructions and the exception table for one function body.

use crate::exception::ExceptionRecord;
use crate::instruction::Instruction;
use crate::module::ModuleError;
use crate::opcode::Opcode;
use serde::{Deserialize, Serialize};

/// A function body: instructions plus its exception table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BytecodeChunk {
    /// Sequence of bytecode instructions
    pub instructions: Vec<Instruction>,
    /// Exception handlers, innermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<ExceptionRecord>,
}

impl BytecodeChunk {
    /// Create a new empty bytecode chunk
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an instruction without a source line
    pub fn emit(&mut self, opcode: Opcode) {
        self.instructions.push(Instruction::new(opcode));
    }

    /// Emit an instruction with a source line
    pub fn emit_with_line(&mut self, opcode: Opcode, line: u32) {
        self.instructions.push(Instruction::with_line(opcode, line));
    }

    /// Get the number of instructions
    pub fn instruction_count(&self) -> usize {
        self.instructions.len()
    }

    /// Opcode at `pc`
    pub fn opcode(&self, pc: usize) -> Option<&Opcode> {
        self.instructions.get(pc).map(|inst| &inst.opcode)
    }

    /// Source line of the instruction at `pc`, or the nearest earlier line
    pub fn line_at(&self, pc: usize) -> u32 {
        self.instructions
            .iter()
            .take(pc + 1)
            .rev()
            .map(|inst| inst.line)
            .find(|&line| line != 0)
            .unwrap_or(0)
    }

    /// Checks jump targets, handler ranges and constant indices.
    ///
    /// # Errors
    ///
    /// Returns [`ModuleError::Invalid`] describing the first violation.
    pub fn validate(&self, constant_count: usize) -> Result<(), ModuleError> {
        let len = self.instructions.len() as u32;
        for (pc, inst) in self.instructions.iter().enumerate() {
            if let Some(target) = inst.opcode.jump_target() {
                if target > len {
                    return Err(ModuleError::Invalid(format!(
                        "jump at {} targets {} beyond end {}",
                        pc, target, len
                    )));
                }
            }
            if let Some(index) = inst.opcode.constant_index() {
                if index as usize >= constant_count {
                    return Err(ModuleError::Invalid(format!(
                        "instruction at {} uses constant {} of {}",
                        pc, index, constant_count
                    )));
                }
            }
        }
        for handler in &self.handlers {
            let ordered = handler.try_start <= handler.try_end
                && handler.handler_start <= handler.handler_end;
            if !ordered || handler.try_end > len || handler.handler_end > len {
                return Err(ModuleError::Invalid(format!(
                    "exception handler range {}..{} / {}..{} outside code of length {}",
                    handler.try_start,
                    handler.try_end,
                    handler.handler_start,
                    handler.handler_end,
                    len
                )));
            }
        }
        Ok(())
    }
}
