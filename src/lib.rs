//! CHIP-8 interpreter core.
//!
//! [`Chip8`] owns one machine: 4KB of memory, sixteen 8-bit registers, the
//! index register, a 16-level call stack, two 60Hz timers, the 64x32
//! framebuffer and the hex key latch. It performs no I/O of its own; a driver
//! feeds it a ROM, calls [`Chip8::cycle`] and [`Chip8::tick_timers`], and
//! presents [`Chip8::framebuffer`].

pub mod chip8;
pub mod display;
pub mod error;
pub mod instruction;
pub mod state;

pub use chip8::{Chip8, Step};
pub use display::{DISPLAY_HEIGHT, DISPLAY_WIDTH, Framebuffer};
pub use error::Chip8Error;
pub use instruction::{AluOp, Instruction};
pub use state::{Key, Quirks, Register};
