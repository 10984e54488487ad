use std::path::PathBuf;

use chip8_interp::Quirks;
use clap::Parser;

pub const DEFAULT_FRAME_RATE: u64 = 60;
pub const DEFAULT_INSTRUCTIONS_PER_SECOND: u64 = 700;

/// Run a CHIP-8 ROM in the terminal.
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Settings {
    /// Path to the ROM image
    pub rom: PathBuf,

    /// Frames (and timer ticks) per second
    #[arg(
        long,
        default_value_t = DEFAULT_FRAME_RATE,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub frame_rate: u64,

    /// Instructions executed per second
    #[arg(long, default_value_t = DEFAULT_INSTRUCTIONS_PER_SECOND)]
    pub ips: u64,

    /// Seed for the random number opcode
    #[arg(long)]
    pub seed: Option<u64>,

    /// 8xy6/8xyE shift Vy into Vx
    #[arg(long)]
    pub shift_uses_vy: bool,

    /// 8xy1/8xy2/8xy3 clear VF
    #[arg(long)]
    pub logic_resets_vf: bool,

    /// Fx55/Fx65 advance I past the registers transferred
    #[arg(long)]
    pub load_store_increments_index: bool,

    /// Disable the sound timer beep
    #[arg(long)]
    pub mute: bool,

    /// Write log output to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Run without a terminal UI
    #[arg(long, requires = "max_cycles")]
    pub headless: bool,

    /// Stop after this many instructions
    #[arg(long)]
    pub max_cycles: Option<u64>,

    /// Print the register dump when the run ends
    #[arg(long)]
    pub dump: bool,
}

impl Settings {
    pub fn quirks(&self) -> Quirks {
        Quirks {
            shift_uses_vy: self.shift_uses_vy,
            logic_resets_vf: self.logic_resets_vf,
            load_store_increments_index: self.load_store_increments_index,
        }
    }

    pub fn instructions_per_frame(&self) -> u64 {
        (self.ips / self.frame_rate).max(1)
    }
}
