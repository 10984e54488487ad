use std::io::Read;

use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::display::{DISPLAY_HEIGHT, DISPLAY_WIDTH, FONT_HEIGHT, Framebuffer};
use crate::error::Result;
use crate::instruction::Instruction;
use crate::state::{
    Address, Chip8State, FONT_ADDR, Key, MAX_ROM_SIZE, NUM_KEYS, Quirks, Register,
};

/// What a single call to [`Chip8::cycle`] did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    Executed(Instruction),
    /// The opcode is outside the instruction set and was stepped over.
    Skipped { opcode: u16 },
    /// Fx0A found no key held; the same instruction runs again next cycle.
    WaitingForKey,
}

/// A CHIP-8 interpreter.
///
/// The driver owns pacing: it calls [`Chip8::cycle`] at whatever
/// instruction rate it likes and [`Chip8::tick_timers`] at 60Hz, pushes key
/// state in through the key latch methods and presents the framebuffer
/// whenever [`Chip8::redraw_requested`] is set.
pub struct Chip8 {
    state: Chip8State,
    quirks: Quirks,
    rng: StdRng,
}

impl Chip8 {
    pub fn new() -> Self {
        Chip8 {
            state: Chip8State::new(),
            quirks: Quirks::default(),
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic random source for Cxkk.
    pub fn with_seed(seed: u64) -> Self {
        Chip8 {
            state: Chip8State::new(),
            quirks: Quirks::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_quirks(mut self, quirks: Quirks) -> Self {
        self.quirks = quirks;
        self
    }

    pub fn quirks(&self) -> &Quirks {
        &self.quirks
    }

    pub fn state(&self) -> &Chip8State {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut Chip8State {
        &mut self.state
    }

    /// Return every register, timer, key and pixel to its power-on value and
    /// reinstall the font.
    pub fn reset(&mut self) {
        debug!("Resetting machine state");
        self.state.reset();
    }

    /// Reset and copy `rom` to 0x200. Bytes past the end of memory are
    /// dropped. Returns the number of bytes loaded.
    pub fn load_rom(&mut self, rom: &[u8]) -> usize {
        self.reset();
        let loaded = self.state.memory.load_rom(rom);
        if loaded < rom.len() {
            warn!(
                "ROM is {} bytes, only the first {} were loaded",
                rom.len(),
                loaded
            );
        }
        debug!("Loaded {} ROM bytes", loaded);
        loaded
    }

    /// Reset and read at most the usable program space from `reader`.
    ///
    /// On a read error the machine is left freshly reset, never partially
    /// loaded.
    pub fn load_rom_from(&mut self, reader: impl Read) -> Result<usize> {
        self.reset();
        let mut rom = Vec::with_capacity(MAX_ROM_SIZE);
        reader.take(MAX_ROM_SIZE as u64).read_to_end(&mut rom)?;
        Ok(self.load_rom(&rom))
    }

    /// Fetch, decode and execute one instruction.
    ///
    /// Unknown opcodes are logged and stepped over. Any error returned is
    /// fatal to the run.
    pub fn cycle(&mut self) -> Result<Step> {
        let pc = self.state.pc;
        let raw = self.state.memory.read_word(usize::from(pc))?;

        // Advance before executing so calls save the next instruction and
        // jumps, skips and waits adjust from here.
        self.state.pc = pc.wrapping_add(2);

        match Instruction::decode(raw, pc) {
            Ok(instruction) => {
                trace!("{:#06X}: {:04X} {:?}", pc, raw, instruction);
                let result = self.execute(instruction);
                if result.is_err() {
                    // Leave PC on the faulting instruction.
                    self.state.pc = pc;
                }
                result
            }
            Err(err) if !err.is_fatal() => {
                warn!("{}, skipping", err);
                Ok(Step::Skipped { opcode: raw })
            }
            Err(err) => Err(err),
        }
    }

    /// Run up to `count` cycles, stopping at the first fatal error.
    pub fn run_cycles(&mut self, count: usize) -> Result<()> {
        for _ in 0..count {
            self.cycle()?;
        }
        Ok(())
    }

    /// Apply `instruction` with PC already pointing at the following opcode.
    pub fn execute(&mut self, instruction: Instruction) -> Result<Step> {
        let state = &mut self.state;
        let pc = state.pc;

        match instruction {
            Instruction::ClearScreen => state.display.clear(),
            Instruction::Return => {
                state.pc = state.stack.pop(pc.wrapping_sub(2))?;
            }
            Instruction::Jump(addr) => state.pc = addr,
            Instruction::Call(addr) => {
                state.stack.push(pc, pc.wrapping_sub(2))?;
                state.pc = addr;
            }
            Instruction::SkipEqImmediate(x, nn) => {
                if state.registers.read(x) == nn {
                    state.pc += 2;
                }
            }
            Instruction::SkipNeqImmediate(x, nn) => {
                if state.registers.read(x) != nn {
                    state.pc += 2;
                }
            }
            Instruction::SkipEqRegister(x, y) => {
                if state.registers.read(x) == state.registers.read(y) {
                    state.pc += 2;
                }
            }
            Instruction::SkipNeqRegister(x, y) => {
                if state.registers.read(x) != state.registers.read(y) {
                    state.pc += 2;
                }
            }
            Instruction::SetImmediate(x, nn) => state.registers.write(x, nn),
            Instruction::AddImmediate(x, nn) => {
                let value = state.registers.read(x).wrapping_add(nn);
                state.registers.write(x, value);
            }
            Instruction::Alu(op, x, y) => {
                let result = op.apply(
                    state.registers.read(x),
                    state.registers.read(y),
                    &self.quirks,
                );
                state.registers.write(x, result.value);
                if let Some(flag) = result.flag {
                    state.registers.set_flag(flag);
                }
            }
            Instruction::SetIndex(addr) => state.index = addr,
            Instruction::JumpWithOffset(addr) => {
                state.pc = Address::from(state.registers.read(Register::V0)) + addr;
            }
            Instruction::Random(x, nn) => {
                let value = self.rng.random::<u8>() & nn;
                state.registers.write(x, value);
            }
            Instruction::Draw(x, y, rows) => {
                let pos_x = usize::from(state.registers.read(x));
                let pos_y = usize::from(state.registers.read(y));
                let sprite = state.memory.read_sprite(state.index, rows)?;

                let collision = state.display.draw_sprite(
                    pos_x % DISPLAY_WIDTH,
                    pos_y % DISPLAY_HEIGHT,
                    sprite,
                );
                state.registers.set_flag(collision);
            }
            Instruction::SkipIfKeyPressed(x) => {
                if key_held(state, x) {
                    state.pc += 2;
                }
            }
            Instruction::SkipIfKeyNotPressed(x) => {
                if !key_held(state, x) {
                    state.pc += 2;
                }
            }
            Instruction::ReadDelayTimer(x) => state.registers.write(x, state.timers.delay),
            Instruction::WaitForKey(x) => match state.keypad.first_pressed() {
                Some(key) => state.registers.write(x, key.index()),
                None => {
                    state.pc = state.pc.wrapping_sub(2);
                    return Ok(Step::WaitingForKey);
                }
            },
            Instruction::SetDelayTimer(x) => state.timers.delay = state.registers.read(x),
            Instruction::SetSoundTimer(x) => state.timers.sound = state.registers.read(x),
            Instruction::AddToIndex(x) => {
                state.index = state
                    .index
                    .wrapping_add(Address::from(state.registers.read(x)));
            }
            Instruction::FontChar(x) => {
                let digit = usize::from(state.registers.read(x));
                state.index = (FONT_ADDR + digit * FONT_HEIGHT) as Address;
            }
            Instruction::BinaryCodedDecimal(x) => {
                let value = state.registers.read(x);
                let base = usize::from(state.index);
                let bcd = [value / 100, (value / 10) % 10, value % 10];
                state.memory.check_range(base, bcd.len())?;
                for (i, &digit) in bcd.iter().enumerate() {
                    state.memory.write(base + i, digit)?;
                }
            }
            Instruction::StoreRegisters(x) => {
                let base = usize::from(state.index);
                state.memory.check_range(base, x.index() + 1)?;
                for (i, &reg) in Register::ALL[..=x.index()].iter().enumerate() {
                    state.memory.write(base + i, state.registers.read(reg))?;
                }
                if self.quirks.load_store_increments_index {
                    state.index = state.index.wrapping_add(x.index() as Address + 1);
                }
            }
            Instruction::LoadRegisters(x) => {
                let base = usize::from(state.index);
                state.memory.check_range(base, x.index() + 1)?;
                for (i, &reg) in Register::ALL[..=x.index()].iter().enumerate() {
                    let value = state.memory.read(base + i)?;
                    state.registers.write(reg, value);
                }
                if self.quirks.load_store_increments_index {
                    state.index = state.index.wrapping_add(x.index() as Address + 1);
                }
            }
        }

        Ok(Step::Executed(instruction))
    }

    /// One 60Hz timer tick. Returns true if the beep should sound during
    /// this tick.
    pub fn tick_timers(&mut self) -> bool {
        self.state.timers.tick()
    }

    pub fn sound_active(&self) -> bool {
        self.state.timers.sound_active()
    }

    pub fn press_key(&mut self, key: Key) {
        if !self.state.keypad.is_key_pressed(key) {
            debug!("Key {:X} down", key.index());
        }
        self.state.keypad.press_key(key);
    }

    pub fn release_key(&mut self, key: Key) {
        if self.state.keypad.is_key_pressed(key) {
            debug!("Key {:X} up", key.index());
        }
        self.state.keypad.release_key(key);
    }

    /// Set a key by raw index. Indices outside 0x0-0xF are ignored.
    pub fn set_key(&mut self, index: u8, pressed: bool) {
        match Key::from_index(index) {
            Some(key) if pressed => self.press_key(key),
            Some(key) => self.release_key(key),
            None => warn!("Ignoring out of range key index {:#04X}", index),
        }
    }

    pub fn release_all_keys(&mut self) {
        self.state.keypad.release_all();
    }

    pub fn keys(&self) -> &[bool; NUM_KEYS] {
        self.state.keypad.as_array()
    }

    pub fn framebuffer(&self) -> &Framebuffer {
        &self.state.display
    }

    pub fn redraw_requested(&self) -> bool {
        self.state.display.redraw_requested()
    }

    /// Called by the presentation layer once the frame has been shown.
    pub fn acknowledge_redraw(&mut self) {
        self.state.display.acknowledge_redraw();
    }

    /// Human-readable register file, timers and stack.
    pub fn dump(&self) -> String {
        self.state.to_string()
    }
}

impl Default for Chip8 {
    fn default() -> Self {
        Self::new()
    }
}

fn key_held(state: &Chip8State, reg: Register) -> bool {
    Key::from_index(state.registers.read(reg))
        .is_some_and(|key| state.keypad.is_key_pressed(key))
}
