use thiserror::Error;

use crate::state::Address;

/// Everything that can go wrong inside the interpreter core.
#[derive(Debug, Error)]
pub enum Chip8Error {
    #[error("Unable to read ROM: {0}")]
    RomLoad(#[from] std::io::Error),

    #[error("Stack overflow: subroutine call at {pc:#06X} exceeds 16 nested levels")]
    StackOverflow { pc: Address },

    #[error("Stack underflow: return at {pc:#06X} with an empty call stack")]
    StackUnderflow { pc: Address },

    #[error("Memory access out of bounds at address {address:#06X}")]
    MemoryOutOfBounds { address: usize },

    #[error("Unknown opcode {opcode:#06X} at {pc:#06X}")]
    UnknownOpcode { opcode: u16, pc: Address },
}

impl Chip8Error {
    /// Unknown opcodes are skipped; every other condition ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Chip8Error::UnknownOpcode { .. })
    }
}

pub type Result<T> = std::result::Result<T, Chip8Error>;
