//! MixPlay - terminal music player over a shared mixing bus.
//!
//! Given file arguments the player runs through them sequentially, or all
//! at once in multi-track mode. Without arguments it opens a full-screen
//! playlist menu over the configured music directory, with cross-fading,
//! looping and a toggleable echo effect on the master output.
//!
//! The binary exits 0 on a normal run, 1 on a usage error, 2 when the
//! device or a file refuses to open, and 255 when no output device exists.

use clap::{CommandFactory, Parser};
use clap_complete::{Generator, Shell, generate};
use log::warn;
use owo_colors::OwoColorize;
use std::error::Error;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

mod config;
mod constants;
mod mixer;
mod player;

use config::Config;
use constants::{
    DEFAULT_BUFFERS, DEFAULT_CHANNELS, DEFAULT_RATE, EXIT_AUDIO, EXIT_INIT, EXIT_OK, EXIT_USAGE,
    LOG_FILE, MAX_VOLUME,
};
use mixer::{DeviceRequest, Mixer, SampleFormat};
use player::Session;

#[derive(Parser)]
#[command(name = "mixplay")]
#[command(about = "Terminal music player with cross-fade, echo and a playlist menu")]
#[command(version)]
struct Cli {
    /// Pump a text command menu while each track plays
    #[arg(short, long)]
    interactive: bool,

    /// Loop each track forever
    #[arg(short, long = "loop")]
    looping: bool,

    /// Ask the device for 8-bit output
    #[arg(short = '8', long = "u8")]
    eight_bit: bool,

    /// Ask the device for 32-bit float output
    #[arg(long = "f32")]
    float32: bool,

    /// Output sample rate in Hz
    #[arg(short, long, default_value_t = DEFAULT_RATE)]
    rate: u32,

    /// Output channel count
    #[arg(short, long, default_value_t = DEFAULT_CHANNELS)]
    channels: u16,

    /// Force mono output
    #[arg(short, long)]
    mono: bool,

    /// Audio buffer size in sample frames
    #[arg(short, long, default_value_t = DEFAULT_BUFFERS)]
    buffers: u32,

    /// Master volume, 0-128
    #[arg(short, long, default_value_t = MAX_VOLUME)]
    volume: u32,

    /// Read whole files into memory before decoding
    #[arg(long)]
    rwops: bool,

    /// Play all files at the same time
    #[arg(long = "multi", alias = "mm")]
    multi: bool,

    /// Cross-fade between consecutive tracks
    #[arg(long = "crossfade", alias = "cf")]
    crossfade: bool,

    /// Generate shell completions
    #[arg(long, value_enum, value_name = "SHELL")]
    completions: Option<Shell>,

    /// Music files to play; with none, the playlist menu opens
    files: Vec<PathBuf>,
}

impl Cli {
    fn device_request(&self) -> DeviceRequest {
        let format = if self.float32 {
            SampleFormat::F32
        } else if self.eight_bit {
            SampleFormat::U8
        } else {
            SampleFormat::S16
        };
        DeviceRequest {
            rate: self.rate,
            channels: if self.mono { 1 } else { self.channels },
            format,
            buffers: self.buffers,
        }
    }
}

fn print_completions<G: Generator>(generator: G, cmd: &mut clap::Command) {
    generate(
        generator,
        cmd,
        cmd.get_name().to_string(),
        &mut io::stdout(),
    );
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version land here too; only real mistakes are errors
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(EXIT_USAGE)
            } else {
                ExitCode::from(EXIT_OK)
            };
        }
    };

    if let Some(shell) = cli.completions {
        let mut cmd = Cli::command();
        print_completions(shell, &mut cmd);
        return ExitCode::from(EXIT_OK);
    }

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            ExitCode::from(EXIT_AUDIO)
        }
    }
}

fn run(cli: Cli) -> Result<u8, Box<dyn Error>> {
    let menu_mode = cli.files.is_empty();
    init_logging(menu_mode)?;

    let config = Config::load().unwrap_or_else(|e| {
        warn!("could not read config, using defaults: {e}");
        Config::new()
    });

    let device = match Mixer::default_device() {
        Ok(device) => device,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            return Ok(EXIT_INIT);
        }
    };
    let mixer = match Mixer::open(device, &cli.device_request()) {
        Ok(mixer) => mixer,
        Err(e) => {
            eprintln!("{} {e}", "Error:".red().bold());
            return Ok(EXIT_AUDIO);
        }
    };
    mixer.set_volume(cli.volume);

    let music_cmd = std::env::var("MUSIC_CMD").ok();
    let mut session = Session::new(config, mixer, cli.rwops, music_cmd);

    let code = if menu_mode {
        player::menu::run(&mut session)?;
        EXIT_OK
    } else if cli.multi {
        player::driver::run_multi(&session, &cli.files, cli.looping)?
    } else {
        player::driver::run_sequential(
            &session,
            &cli.files,
            cli.looping,
            cli.crossfade,
            cli.interactive,
        )?
    };

    session.close();
    Ok(code)
}

fn init_logging(menu_mode: bool) -> Result<(), Box<dyn Error>> {
    use simplelog::*;
    use std::fs::File;

    let log_path = std::env::temp_dir().join(LOG_FILE);
    let file_logger = WriteLogger::new(
        LevelFilter::Debug,
        Config::default(),
        File::create(&log_path)?,
    );
    if menu_mode {
        // The menu owns the terminal; everything goes to the file
        CombinedLogger::init(vec![file_logger])?;
    } else {
        CombinedLogger::init(vec![
            file_logger,
            TermLogger::new(
                LevelFilter::Warn,
                Config::default(),
                TerminalMode::Stderr,
                ColorChoice::Auto,
            ),
        ])?;
    }
    Ok(())
}
