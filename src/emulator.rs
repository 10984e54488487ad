use std::fs::File;
use std::io::BufReader;
use std::time::{Duration, Instant};

use anyhow::Context;
use chip8_interp::state::NUM_KEYS;
use chip8_interp::{Chip8, DISPLAY_HEIGHT, DISPLAY_WIDTH, Key};
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use log::{info, warn};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::Alignment,
    style::{Color, Style},
    widgets::{Block, Borders, Paragraph},
};
use rodio::{OutputStream, Sink, Source, source::SineWave};

use crate::settings::Settings;

const DEFAULT_FREQUENCY: f32 = 440.0;

/// Terminals rarely report key releases, so a key stays held for this many
/// frames after its last press or repeat event.
const KEY_HOLD_FRAMES: u8 = 30;

pub struct Beep {
    sink: Sink,
    #[allow(dead_code)]
    stream: OutputStream,
}

impl Beep {
    pub fn new(freq: f32) -> anyhow::Result<Self> {
        let (stream, stream_handle) = OutputStream::try_default()?;
        let sink = Sink::try_new(&stream_handle)?;
        let source = SineWave::new(freq).repeat_infinite();

        sink.append(source);
        sink.pause();

        Ok(Self { sink, stream })
    }

    pub fn set(&mut self, on: bool) {
        if on {
            self.sink.play();
        } else {
            self.sink.pause();
        }
    }
}

/// Map the left-hand block of a QWERTY keyboard onto the hex keypad.
///
/// ```text
/// 1 2 3 4        1 2 3 C
/// Q W E R   →    4 5 6 D
/// A S D F        7 8 9 E
/// Z X C V        A 0 B F
/// ```
pub fn keymap(code: KeyCode) -> Option<Key> {
    let KeyCode::Char(c) = code else {
        return None;
    };
    match c.to_ascii_lowercase() {
        '1' => Some(Key::Key1),
        '2' => Some(Key::Key2),
        '3' => Some(Key::Key3),
        '4' => Some(Key::KeyC),
        'q' => Some(Key::Key4),
        'w' => Some(Key::Key5),
        'e' => Some(Key::Key6),
        'r' => Some(Key::KeyD),
        'a' => Some(Key::Key7),
        's' => Some(Key::Key8),
        'd' => Some(Key::Key9),
        'f' => Some(Key::KeyE),
        'z' => Some(Key::KeyA),
        'x' => Some(Key::Key0),
        'c' => Some(Key::KeyB),
        'v' => Some(Key::KeyF),
        _ => None,
    }
}

pub struct Emulator {
    chip8: Chip8,
    settings: Settings,
    beeper: Option<Beep>,
    held: [u8; NUM_KEYS],
}

impl Emulator {
    pub fn new(settings: Settings) -> anyhow::Result<Self> {
        let chip8 = match settings.seed {
            Some(seed) => Chip8::with_seed(seed),
            None => Chip8::new(),
        }
        .with_quirks(settings.quirks());

        let beeper = if settings.mute || settings.headless {
            None
        } else {
            match Beep::new(DEFAULT_FREQUENCY) {
                Ok(beep) => Some(beep),
                Err(e) => {
                    warn!("No audio output, running silent: {e}");
                    None
                }
            }
        };

        let mut emulator = Emulator {
            chip8,
            settings,
            beeper,
            held: [0; NUM_KEYS],
        };
        emulator.load()?;
        Ok(emulator)
    }

    fn load(&mut self) -> anyhow::Result<()> {
        let path = &self.settings.rom;
        let file =
            File::open(path).with_context(|| format!("Cannot open ROM {}", path.display()))?;
        let loaded = self
            .chip8
            .load_rom_from(BufReader::new(file))
            .with_context(|| format!("Cannot read ROM {}", path.display()))?;
        info!("Loaded {} bytes from {}", loaded, path.display());
        Ok(())
    }

    pub fn dump(&self) -> String {
        self.chip8.dump()
    }

    fn rom_name(&self) -> String {
        self.settings
            .rom
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Unknown ROM".to_string())
    }

    /// Execute one frame's worth of instructions, then tick the timers once.
    fn step_frame(&mut self, budget: &mut u64) -> anyhow::Result<()> {
        for _ in 0..self.settings.instructions_per_frame() {
            if *budget == 0 {
                break;
            }
            *budget -= 1;
            self.chip8.cycle().context("Emulation stopped")?;
        }

        let beep = self.chip8.tick_timers();
        if let Some(beeper) = self.beeper.as_mut() {
            beeper.set(beep);
        }
        Ok(())
    }

    fn cycle_budget(&self) -> u64 {
        self.settings.max_cycles.unwrap_or(u64::MAX)
    }

    /// Run without a terminal until the cycle limit is reached.
    pub fn run_headless(&mut self) -> anyhow::Result<()> {
        let mut budget = self.cycle_budget();
        while budget > 0 {
            self.step_frame(&mut budget)?;
        }
        Ok(())
    }

    pub fn run(&mut self) -> anyhow::Result<()> {
        enable_raw_mode().context("Cannot enable raw terminal mode")?;
        let result = self.run_terminal();
        disable_raw_mode()?;
        if let Some(beeper) = self.beeper.as_mut() {
            beeper.set(false);
        }
        result
    }

    fn run_terminal(&mut self) -> anyhow::Result<()> {
        let frame_duration = Duration::from_secs_f64(1.0 / self.settings.frame_rate as f64);
        let rom_name = self.rom_name();
        let mut budget = self.cycle_budget();

        let stdout = std::io::stdout();
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        'mainloop: while budget > 0 {
            let frame_start = Instant::now();

            while event::poll(Duration::ZERO)? {
                if let Event::Key(key) = event::read()? {
                    if key.code == KeyCode::Esc {
                        break 'mainloop;
                    }
                    if let Some(chip8_key) = keymap(key.code) {
                        self.handle_key(chip8_key, key.kind);
                    }
                }
            }

            self.step_frame(&mut budget)?;

            if self.chip8.redraw_requested() {
                terminal.draw(|frame| self.draw(frame, &rom_name))?;
                self.chip8.acknowledge_redraw();
            }

            self.age_held_keys();

            let elapsed = frame_start.elapsed();
            if elapsed < frame_duration {
                std::thread::sleep(frame_duration - elapsed);
            }
        }
        terminal.clear()?;

        Ok(())
    }

    fn handle_key(&mut self, key: Key, kind: KeyEventKind) {
        let slot = usize::from(key.index());
        match kind {
            KeyEventKind::Release => {
                self.held[slot] = 0;
                self.chip8.release_key(key);
            }
            _ => {
                self.held[slot] = KEY_HOLD_FRAMES;
                self.chip8.press_key(key);
            }
        }
    }

    fn age_held_keys(&mut self) {
        for key in Key::ALL {
            let slot = usize::from(key.index());
            if self.held[slot] == 0 {
                continue;
            }
            self.held[slot] -= 1;
            if self.held[slot] == 0 {
                self.chip8.release_key(key);
            }
        }
    }

    fn draw(&self, frame: &mut ratatui::Frame, rom_name: &str) {
        use ratatui::layout::{Constraint, Direction, Layout};

        // +2 on each axis for the borders
        let game_width = (DISPLAY_WIDTH as u16) + 2;
        let game_height = (DISPLAY_HEIGHT as u16) + 2;

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(game_height),
                Constraint::Length(7),
                Constraint::Min(0),
            ])
            .split(frame.area());

        let game_area = if chunks[0].width > game_width {
            Layout::default()
                .direction(Direction::Horizontal)
                .constraints([
                    Constraint::Min(0),
                    Constraint::Length(game_width),
                    Constraint::Min(0),
                ])
                .split(chunks[0])[1]
        } else {
            chunks[0]
        };

        let mut screen = String::with_capacity(DISPLAY_WIDTH * DISPLAY_HEIGHT + DISPLAY_HEIGHT);
        for row in self.chip8.framebuffer().rows() {
            screen.extend(row.iter().map(|&lit| if lit { '█' } else { ' ' }));
            screen.push('\n');
        }
        let game_paragraph = Paragraph::new(screen)
            .block(Block::default().borders(Borders::ALL).title(rom_name))
            .style(Style::default().fg(Color::White));
        frame.render_widget(game_paragraph, game_area);

        let key_mapping = "Key Mapping (Esc quits):\n\
    1 2 3 4    →    1 2 3 C\n\
    Q W E R    →    4 5 6 D\n\
    A S D F    →    7 8 9 E\n\
    Z X C V    →    A 0 B F";
        let key_paragraph = Paragraph::new(key_mapping)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title("Keypad"))
            .style(Style::default().fg(Color::Yellow));
        frame.render_widget(key_paragraph, chunks[1]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn headless(name: &str, rom: &[u8]) -> Emulator {
        let path = std::env::temp_dir().join(format!("chip8-{}-{name}.ch8", std::process::id()));
        std::fs::write(&path, rom).unwrap();
        let settings = Settings::try_parse_from([
            "chip8",
            path.to_str().unwrap(),
            "--headless",
            "--max-cycles",
            "100",
        ])
        .unwrap();
        let emulator = Emulator::new(settings).unwrap();
        std::fs::remove_file(&path).unwrap();
        emulator
    }

    #[test]
    fn test_key_held_until_window_expires() {
        let mut emulator = headless("hold", &[0x12, 0x00]);
        emulator.handle_key(Key::Key5, KeyEventKind::Press);

        for _ in 0..KEY_HOLD_FRAMES - 1 {
            emulator.age_held_keys();
            assert!(emulator.chip8.keys()[0x5]);
        }
        emulator.age_held_keys();
        assert!(!emulator.chip8.keys()[0x5]);
    }

    #[test]
    fn test_key_release_event_releases_immediately() {
        let mut emulator = headless("release", &[0x12, 0x00]);
        emulator.handle_key(Key::KeyA, KeyEventKind::Press);
        emulator.handle_key(Key::KeyA, KeyEventKind::Release);
        assert!(!emulator.chip8.keys()[0xA]);
        emulator.age_held_keys();
        assert!(!emulator.chip8.keys()[0xA]);
    }

    #[test]
    fn test_fatal_error_message_has_no_dump() {
        let mut emulator = headless("underflow", &[0x00, 0xEE]);
        let err = emulator.run_headless().unwrap_err();
        let message = format!("{err:#}");

        assert!(message.contains("Stack underflow"));
        assert!(!message.contains("PC="));
        assert!(emulator.dump().contains("PC=0x0200"));
    }

    #[test]
    fn test_keymap() {
        assert_eq!(keymap(KeyCode::Char('1')), Some(Key::Key1));
        assert_eq!(keymap(KeyCode::Char('X')), Some(Key::Key0));
        assert_eq!(keymap(KeyCode::Char('v')), Some(Key::KeyF));
        assert_eq!(keymap(KeyCode::Char('p')), None);
        assert_eq!(keymap(KeyCode::Enter), None);
    }
}
