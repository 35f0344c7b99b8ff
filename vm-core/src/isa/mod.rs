//! The instruction set architecture: opcode identities (C1) and the fixed
//! 32-bit encoding (C2) shared by the compiler and the execution engine.

mod instruction;
mod opcode;

pub use instruction::{Instruction, InstructionFlags};
pub use opcode::{VMOpcode, MAX_OPCODE};

/// Maximum number of instructions a single loaded program may contain.
pub const MAX_PROGRAM_LEN: usize = 65_535;

/// A program is simply an ordered, immutable sequence of instructions.
pub type Program = Vec<Instruction>;
