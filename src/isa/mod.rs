// This module defines the instruction model for the DLX source ISA: a register newtype
// enforcing the 0-31 range, a closed tagged-variant type over the operand shapes the
// teaching architecture uses (nullary, register list, register+immediate, register
// indirect with index register, register+label), and the Instruction pairing an opcode
// string with its operands. The model is produced by the parser and consumed read-only
// by the translation loop; Display renders the source assembly spelling for the
// compiled-program trace dump.

//! DLX instruction model.

use std::fmt;

pub mod parser;

pub use parser::{CodLine, Program};

/// Number of architectural DLX registers.
pub const DLX_REGISTER_COUNT: usize = 32;

/// A DLX register number in `0..32`.
///
/// Register 0 is hard-wired to zero: reads synthesize the constant and
/// writes are suppressed by the translation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reg(u8);

impl Reg {
    pub const ZERO: Reg = Reg(0);

    /// Create a register, rejecting numbers outside the architectural file.
    pub fn new(number: u8) -> Option<Reg> {
        (number < DLX_REGISTER_COUNT as u8).then_some(Reg(number))
    }

    pub fn number(self) -> u8 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// Operand payload of a decoded instruction, one variant per textual shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operands {
    /// No operands (`NOP`).
    Nullary,
    /// Comma-separated register list (`ADD R1, R2, R3`).
    Registers(Vec<Reg>),
    /// Source register, immediate, destination register (`ADDI R1, 0x3, R2`).
    Immediate { src: Reg, dest: Reg, imm: i32 },
    /// Data register and base-plus-index address (`LDW R1, 0x8(R2)`).
    Indirect { data: Reg, offset: i32, index: Reg },
    /// Condition register and branch target label (`BRLE R1, loop`).
    Label { reg: Reg, label: String },
}

/// One decoded DLX instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: String,
    pub operands: Operands,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operands {
            Operands::Nullary => write!(f, "{}", self.opcode),
            Operands::Registers(regs) => {
                write!(f, "{}\t", self.opcode)?;
                for (i, reg) in regs.iter().enumerate() {
                    if i != 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{reg}")?;
                }
                Ok(())
            }
            Operands::Immediate { src, dest, imm } => {
                write!(f, "{}\t{}, {:x}, {}", self.opcode, src, *imm as u32, dest)
            }
            Operands::Indirect { data, offset, index } => {
                write!(f, "{}\t{}, 0x{:x}({})", self.opcode, data, *offset as u32, index)
            }
            Operands::Label { reg, label } => {
                write!(f, "{}\t{}, {}", self.opcode, reg, label)
            }
        }
    }
}
