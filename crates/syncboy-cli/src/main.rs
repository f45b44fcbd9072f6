mod error;
mod output;
mod scenario;

use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;

use syncboy_core::frontend::FrameBuffer;
use syncboy_core::gameboy::GameBoy;

use crate::error::CliError;
use crate::output::WavRecorder;
use crate::scenario::Scenario;

#[derive(Parser, Debug)]
#[command(version, about = "Headless driver for the syncboy video and audio core")]
struct Args {
    /// Scenario file (TOML). The built-in demo runs when omitted
    scenario: Option<PathBuf>,

    /// Number of frames to run, overrides the scenario
    #[arg(long)]
    frames: Option<u32>,

    /// Save the last frame as a PNG
    #[arg(long)]
    png: Option<PathBuf>,

    /// Record the audio output as a WAV file
    #[arg(long)]
    wav: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn run(args: &Args) -> Result<(), CliError> {
    let scenario = match &args.scenario {
        Some(path) => scenario::load_from_file(path)?,
        None => Scenario::demo(),
    };
    scenario.validate()?;
    let frames = args.frames.unwrap_or(scenario.frames);

    let mut gb = GameBoy::new(scenario.audio, FrameBuffer::new())?;

    let recorder = match &args.wav {
        Some(path) => Some(WavRecorder::start(
            path,
            gb.enable_audio_output(),
            scenario.audio.sample_rate_hz(),
        )?),
        None => None,
    };

    let stats = scenario.run(&mut gb, frames);
    info!("Ran {} frames in {} cycles", stats.frames, stats.cycles);

    // Only complete buffers reach the recorder
    gb.disable_audio_output();
    if let Some(recorder) = recorder {
        recorder.finish()?;
    }

    if let Some(path) = &args.png {
        output::write_png(path, &gb.video)?;
        info!("Saved last frame to {}", path.display());
    }

    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
