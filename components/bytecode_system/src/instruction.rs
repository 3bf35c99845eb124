//! Bytecode instruction representation

use crate::opcode::Opcode;
use serde::{Deserialize, Serialize};

/// A single bytecode instruction with its source line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    /// The opcode for this instruction
    pub opcode: Opcode,
    /// Source line, 0 when unknown
    #[serde(default, skip_serializing_if = "is_unknown_line")]
    pub line: u32,
}

fn is_unknown_line(line: &u32) -> bool {
    *line == 0
}

impl Instruction {
    /// Create a new instruction without a source line
    pub fn new(opcode: Opcode) -> Self {
        Self { opcode, line: 0 }
    }

    /// Create a new instruction with a source line
    pub fn with_line(opcode: Opcode, line: u32) -> Self {
        Self { opcode, line }
    }
}

impl From<Opcode> for Instruction {
    fn from(opcode: Opcode) -> Self {
        Instruction::new(opcode)
    }
}
