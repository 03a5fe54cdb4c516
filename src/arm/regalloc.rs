//! Virtual-to-physical register policy.
//!
//! Stateless rules reconciling the 32 DLX registers against the A32 file:
//! R0 carries the data-memory base pointer for the whole program, DLX 1-7
//! live permanently in R1-R7, and DLX 8-31 are spilled to a stack frame
//! whose slot for register `n` sits at byte offset `(n-8)*4`. Spilled
//! operands travel through one of exactly three scratch registers picked
//! by operand role; the third-source scratch doubles as the result
//! register, so a result is always staged in R10 before its write-back.

use crate::arm::HostReg;
use crate::isa::Reg;

/// Register holding the data-memory base pointer (first AAPCS argument).
pub const DATA_POINTER: HostReg = HostReg::R0;

/// Scratch register for the first source operand of an instruction.
pub const FIRST_SOURCE_SCRATCH: HostReg = HostReg::R8;
/// Scratch register for the second source operand.
pub const SECOND_SOURCE_SCRATCH: HostReg = HostReg::R9;
/// Scratch register for the third source operand and for results.
pub const RESULT_SCRATCH: HostReg = HostReg::R10;

/// Source-operand position within one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    FirstSource,
    SecondSource,
    ThirdSource,
}

impl Role {
    fn scratch(self) -> HostReg {
        match self {
            Role::FirstSource => FIRST_SOURCE_SCRATCH,
            Role::SecondSource => SECOND_SOURCE_SCRATCH,
            Role::ThirdSource => RESULT_SCRATCH,
        }
    }
}

/// Where a virtual register's value comes from when read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mapping {
    /// Lives in a dedicated physical register; no load needed.
    Direct(HostReg),
    /// The hard-wired zero register; synthesize the constant into the
    /// role's scratch register.
    Zero(HostReg),
    /// Spilled; load from the stack slot into the role's scratch register.
    Spilled { offset: u16, scratch: HostReg },
}

/// Map a virtual register read to its physical source for the given role.
pub fn source(reg: Reg, role: Role) -> Mapping {
    match reg.number() {
        0 => Mapping::Zero(role.scratch()),
        n @ 1..=7 => Mapping::Direct(direct(n)),
        _ => Mapping::Spilled {
            offset: spill_offset(reg),
            scratch: role.scratch(),
        },
    }
}

/// Physical register an instruction writes its result into.
pub fn destination(reg: Reg) -> HostReg {
    match reg.number() {
        n @ 1..=7 => direct(n),
        _ => RESULT_SCRATCH,
    }
}

/// Stack slot a destination must be copied back to after the operation,
/// if it has one.
pub fn write_back_slot(reg: Reg) -> Option<u16> {
    (reg.number() >= 8).then(|| spill_offset(reg))
}

/// Byte offset of a spilled register's slot from the frame base.
pub fn spill_offset(reg: Reg) -> u16 {
    (reg.number() as u16 - 8) * 4
}

fn direct(number: u8) -> HostReg {
    match number {
        1 => HostReg::R1,
        2 => HostReg::R2,
        3 => HostReg::R3,
        4 => HostReg::R4,
        5 => HostReg::R5,
        6 => HostReg::R6,
        7 => HostReg::R7,
        _ => unreachable!("virtual register {number} has no dedicated physical register"),
    }
}
