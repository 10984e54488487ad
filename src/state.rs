use std::fmt;

use crate::display::{FONT, Framebuffer};
use crate::error::{Chip8Error, Result};

pub type Address = u16;

pub const MEM_SIZE: usize = 4096;
pub const FONT_ADDR: usize = 0x000;
pub const PC_START_ADDR: Address = 0x200;
pub const MAX_ROM_SIZE: usize = MEM_SIZE - PC_START_ADDR as usize;
pub const NUM_REGISTERS: usize = 16;
pub const NUM_KEYS: usize = 16;
pub const STACK_DEPTH: usize = 16;

/// The 4KB address space: font at 0x000, program from 0x200.
#[derive(Clone)]
pub struct Memory {
    data: [u8; MEM_SIZE],
}

impl Memory {
    pub fn new() -> Self {
        let data = {
            let mut data = [0; MEM_SIZE];
            data[FONT_ADDR..FONT_ADDR + FONT.len()].copy_from_slice(&FONT);
            data
        };

        Memory { data }
    }

    pub fn read(&self, addr: usize) -> Result<u8> {
        self.data
            .get(addr)
            .copied()
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })
    }

    pub fn write(&mut self, addr: usize, value: u8) -> Result<()> {
        let cell = self
            .data
            .get_mut(addr)
            .ok_or(Chip8Error::MemoryOutOfBounds { address: addr })?;
        *cell = value;
        Ok(())
    }

    /// Fail unless every address in `start..start + len` is inside memory.
    pub fn check_range(&self, start: usize, len: usize) -> Result<()> {
        if len > 0 && start + len > MEM_SIZE {
            return Err(Chip8Error::MemoryOutOfBounds {
                address: start.max(MEM_SIZE),
            });
        }
        Ok(())
    }

    /// Big-endian opcode at `addr`.
    pub fn read_word(&self, addr: usize) -> Result<u16> {
        let high_byte = u16::from(self.read(addr)?);
        let low_byte = u16::from(self.read(addr + 1)?);
        Ok((high_byte << 8) | low_byte)
    }

    /// Copy `rom` to 0x200, dropping anything past the end of memory.
    /// Returns the number of bytes actually loaded.
    pub fn load_rom(&mut self, rom: &[u8]) -> usize {
        let len = rom.len().min(MAX_ROM_SIZE);
        let start = PC_START_ADDR as usize;
        self.data[start..start + len].copy_from_slice(&rom[..len]);
        len
    }

    pub fn read_sprite(&self, index: Address, rows: u8) -> Result<&[u8]> {
        let start = usize::from(index);
        let end = start + usize::from(rows);

        if end > MEM_SIZE {
            return Err(Chip8Error::MemoryOutOfBounds {
                address: end - 1,
            });
        }
        Ok(&self.data[start..end])
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register {
    V0,
    V1,
    V2,
    V3,
    V4,
    V5,
    V6,
    V7,
    V8,
    V9,
    VA,
    VB,
    VC,
    VD,
    VE,
    VF,
}

impl Register {
    pub const ALL: [Register; NUM_REGISTERS] = [
        Register::V0,
        Register::V1,
        Register::V2,
        Register::V3,
        Register::V4,
        Register::V5,
        Register::V6,
        Register::V7,
        Register::V8,
        Register::V9,
        Register::VA,
        Register::VB,
        Register::VC,
        Register::VD,
        Register::VE,
        Register::VF,
    ];

    /// Only the low four bits are significant.
    pub fn from_nibble(nibble: u8) -> Self {
        Self::ALL[usize::from(nibble & 0x0F)]
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Clone, Debug)]
pub struct RegisterBank {
    registers: [u8; NUM_REGISTERS],
}

impl RegisterBank {
    pub fn new() -> Self {
        RegisterBank {
            registers: [0; NUM_REGISTERS],
        }
    }

    pub fn read(&self, reg: Register) -> u8 {
        self.registers[reg.index()]
    }

    pub fn write(&mut self, reg: Register, value: u8) {
        self.registers[reg.index()] = value;
    }

    /// The carry/borrow/collision flag lives in VF.
    pub fn set_flag(&mut self, value: bool) {
        self.write(Register::VF, u8::from(value));
    }

    pub fn as_array(&self) -> &[u8; NUM_REGISTERS] {
        &self.registers
    }
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self::new()
    }
}

/// Sixteen return addresses and a stack pointer. Overflow and underflow are
/// reported, never wrapped.
#[derive(Clone, Debug)]
pub struct CallStack {
    slots: [Address; STACK_DEPTH],
    sp: usize,
}

impl CallStack {
    pub fn new() -> Self {
        CallStack {
            slots: [0; STACK_DEPTH],
            sp: 0,
        }
    }

    /// `pc` is only used for error reporting.
    pub fn push(&mut self, return_address: Address, pc: Address) -> Result<()> {
        let slot = self
            .slots
            .get_mut(self.sp)
            .ok_or(Chip8Error::StackOverflow { pc })?;
        *slot = return_address;
        self.sp += 1;
        Ok(())
    }

    pub fn pop(&mut self, pc: Address) -> Result<Address> {
        if self.sp == 0 {
            return Err(Chip8Error::StackUnderflow { pc });
        }
        self.sp -= 1;
        Ok(self.slots[self.sp])
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Live entries, oldest first.
    pub fn frames(&self) -> &[Address] {
        &self.slots[..self.sp]
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Key0,
    Key1,
    Key2,
    Key3,
    Key4,
    Key5,
    Key6,
    Key7,
    Key8,
    Key9,
    KeyA,
    KeyB,
    KeyC,
    KeyD,
    KeyE,
    KeyF,
}

impl Key {
    pub const ALL: [Key; NUM_KEYS] = [
        Key::Key0,
        Key::Key1,
        Key::Key2,
        Key::Key3,
        Key::Key4,
        Key::Key5,
        Key::Key6,
        Key::Key7,
        Key::Key8,
        Key::Key9,
        Key::KeyA,
        Key::KeyB,
        Key::KeyC,
        Key::KeyD,
        Key::KeyE,
        Key::KeyF,
    ];

    pub fn from_index(index: u8) -> Option<Key> {
        Self::ALL.get(usize::from(index)).copied()
    }

    pub fn index(self) -> u8 {
        self as u8
    }
}

/// Current press state of the sixteen hex keys. Written by the input layer,
/// read by the key opcodes.
#[derive(Clone, Debug, Default)]
pub struct Keypad {
    pressed: [bool; NUM_KEYS],
}

impl Keypad {
    pub fn new() -> Self {
        Keypad {
            pressed: [false; NUM_KEYS],
        }
    }

    pub fn press_key(&mut self, key: Key) {
        self.pressed[usize::from(key.index())] = true;
    }

    pub fn release_key(&mut self, key: Key) {
        self.pressed[usize::from(key.index())] = false;
    }

    pub fn release_all(&mut self) {
        self.pressed = [false; NUM_KEYS];
    }

    pub fn is_key_pressed(&self, key: Key) -> bool {
        self.pressed[usize::from(key.index())]
    }

    /// Lowest-numbered key currently held.
    pub fn first_pressed(&self) -> Option<Key> {
        Key::ALL.into_iter().find(|&key| self.is_key_pressed(key))
    }

    pub fn as_array(&self) -> &[bool; NUM_KEYS] {
        &self.pressed
    }
}

/// Delay and sound counters, decremented at 60Hz by the driver.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Timers {
    pub delay: u8,
    pub sound: u8,
}

impl Timers {
    /// Decrement both counters, stopping at zero. Returns true if the beep
    /// sounds for this tick, i.e. the sound timer was still running.
    pub fn tick(&mut self) -> bool {
        let beep = self.sound > 0;
        self.delay = self.delay.saturating_sub(1);
        self.sound = self.sound.saturating_sub(1);
        beep
    }

    pub fn sound_active(&self) -> bool {
        self.sound > 0
    }
}

/// Switches for opcodes whose behaviour differs between historical
/// interpreters. The default matches the behaviour documented on
/// [`crate::Instruction`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Quirks {
    /// 8xy6/8xyE shift Vy into Vx instead of shifting Vx in place.
    pub shift_uses_vy: bool,
    /// 8xy1/8xy2/8xy3 clear VF.
    pub logic_resets_vf: bool,
    /// Fx55/Fx65 leave I pointing past the last register transferred.
    pub load_store_increments_index: bool,
}

/// All machine state for one loaded program.
#[derive(Clone)]
pub struct Chip8State {
    pub memory: Memory,
    pub registers: RegisterBank,
    pub pc: Address,
    pub index: Address,
    pub stack: CallStack,
    pub timers: Timers,
    pub display: Framebuffer,
    pub keypad: Keypad,
}

impl Chip8State {
    pub fn new() -> Self {
        let mut display = Framebuffer::new();
        display.request_redraw();

        Chip8State {
            memory: Memory::new(),
            registers: RegisterBank::new(),
            pc: PC_START_ADDR,
            index: 0,
            stack: CallStack::new(),
            timers: Timers::default(),
            display,
            keypad: Keypad::new(),
        }
    }

    pub fn reset(&mut self) {
        *self = Chip8State::new();
    }
}

impl Default for Chip8State {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Chip8State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "PC={:#06X} I={:#06X} SP={} DT={} ST={}",
            self.pc,
            self.index,
            self.stack.sp(),
            self.timers.delay,
            self.timers.sound
        )?;
        for (row, chunk) in self.registers.as_array().chunks(8).enumerate() {
            for (col, value) in chunk.iter().enumerate() {
                if col > 0 {
                    write!(f, " ")?;
                }
                write!(f, "V{:X}={:#04X}", row * 8 + col, value)?;
            }
            writeln!(f)?;
        }
        write!(f, "stack:")?;
        if self.stack.frames().is_empty() {
            write!(f, " (empty)")?;
        }
        for addr in self.stack.frames() {
            write!(f, " {:#06X}", addr)?;
        }
        Ok(())
    }
}
