mod emulator;
mod settings;

use std::fs::File;

use anyhow::Context;
use clap::Parser;
use env_logger::{Env, Target};

use crate::emulator::Emulator;
use crate::settings::Settings;

fn init_logging(settings: &Settings) -> anyhow::Result<()> {
    // The terminal UI owns the screen, so stay quiet unless logs go elsewhere.
    let default_filter = if settings.headless || settings.log_file.is_some() {
        "warn"
    } else {
        "error"
    };
    let mut builder =
        env_logger::Builder::from_env(Env::default().default_filter_or(default_filter));

    if let Some(path) = &settings.log_file {
        let file = File::create(path)
            .with_context(|| format!("Cannot create log file {}", path.display()))?;
        builder.target(Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    init_logging(&settings)?;

    let headless = settings.headless;
    let dump = settings.dump;
    let mut emulator = Emulator::new(settings)?;

    let result = if headless {
        emulator.run_headless()
    } else {
        emulator.run()
    };

    // A fatal error always comes with the machine state.
    if result.is_err() {
        eprintln!("{}", emulator.dump());
    } else if dump {
        println!("{}", emulator.dump());
    }
    result
}
