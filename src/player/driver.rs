//! Non-menu playback modes: simultaneous multi-track and sequential.
//!
//! Both modes run on the console without taking over the terminal.
//! Ctrl-C raises an advance request: one request skips ahead, reaching the
//! configured threshold within a single track aborts the whole run.

use dialoguer::{Input, theme::ColorfulTheme};
use log::warn;
use owo_colors::OwoColorize;
use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use super::Session;
use crate::constants::{EXIT_AUDIO, EXIT_OK, MAX_MULTI_TRACKS, TICK};
use crate::mixer::Track;

fn install_advance_handler() -> Result<Arc<AtomicU32>, Box<dyn Error>> {
    let advance = Arc::new(AtomicU32::new(0));
    let hook = advance.clone();
    ctrlc::set_handler(move || {
        hook.fetch_add(1, Ordering::SeqCst);
    })?;
    Ok(advance)
}

/// Play every file at once and wait for all of them to finish.
pub fn run_multi(session: &Session, files: &[PathBuf], looping: bool) -> Result<u8, Box<dyn Error>> {
    let advance = install_advance_handler()?;
    let mut code = EXIT_OK;

    let kept = clamp_multi(files);
    if kept.len() < files.len() {
        warn!(
            "{} tracks requested; playing the first {}",
            files.len(),
            kept.len()
        );
    }

    let mut tracks = Vec::with_capacity(kept.len());
    for path in kept {
        match session.load_track(path, looping) {
            Ok(track) => {
                for line in session.track_summary(&track) {
                    println!("{}", line.cyan());
                }
                tracks.push(track);
            }
            Err(e) => {
                eprintln!("{} {}: {e}", "Error:".red().bold(), path.display());
                code = EXIT_AUDIO;
            }
        }
    }
    if tracks.is_empty() {
        return Ok(EXIT_AUDIO);
    }

    println!("{} {} tracks", "Playing".green().bold(), tracks.len());
    for track in &tracks {
        if let Err(e) = track.play(Some(session.config.fade_in())) {
            eprintln!("{} {}: {e}", "Error:".red().bold(), track.name());
            code = EXIT_AUDIO;
        }
    }

    loop {
        let active = tracks.iter().filter(|t| t.is_playing()).count();
        if active == 0 {
            break;
        }
        if advance.load(Ordering::SeqCst) > 0 {
            println!();
            println!("{}", "Skip requested; fading out".yellow());
            fade_out_all(session, &tracks);
            break;
        }
        let paused = tracks.iter().filter(|t| t.is_paused()).count();
        let clock = tracks
            .iter()
            .find(|t| t.is_playing())
            .map(|t| format_position(t.position()))
            .unwrap_or_default();
        print!("\rPlaying: {active} Paused: {paused}  {clock}   ");
        io::stdout().flush()?;
        thread::sleep(TICK);
    }
    println!();
    Ok(code)
}

/// Play the files one after another. With `interactive` the wait pumps a
/// text command menu; otherwise it reports the position in place.
pub fn run_sequential(
    session: &Session,
    files: &[PathBuf],
    looping: bool,
    crossfade: bool,
    interactive: bool,
) -> Result<u8, Box<dyn Error>> {
    let advance = install_advance_handler()?;
    let threshold = session.config.skip_abort_threshold.max(1);
    let mut code = EXIT_OK;
    let mut previous: Option<Track> = None;

    'tracks: for path in files {
        advance.store(0, Ordering::SeqCst);
        let track = match session.load_track(path, looping) {
            Ok(track) => track,
            Err(e) => {
                eprintln!("{} {}: {e}", "Error:".red().bold(), path.display());
                code = EXIT_AUDIO;
                continue;
            }
        };
        for line in session.track_summary(&track) {
            println!("{}", line.cyan());
        }

        let ramp = if crossfade && previous.is_some() {
            session.config.crossfade()
        } else {
            session.config.fade_in()
        };
        if let Err(e) = track.play(Some(ramp)) {
            eprintln!("{} {}: {e}", "Error:".red().bold(), track.name());
            code = EXIT_AUDIO;
            continue;
        }
        println!("{} {}", "Playing".green().bold(), track.name());

        while track.is_playing() || track.is_paused() {
            if previous.as_ref().is_some_and(|p| !p.is_playing()) {
                previous = None;
            }
            if advance.load(Ordering::SeqCst) > 0 {
                break;
            }
            if interactive {
                if pump_command_menu(session, &track)? {
                    break;
                }
            } else {
                report_position(&track)?;
                thread::sleep(TICK);
            }
        }
        if !interactive {
            println!();
        }

        // A skipped track keeps sounding while the next one comes up when
        // cross-fading; otherwise it fades down before the loop moves on.
        if track.is_playing() {
            if crossfade {
                track.fade_out(session.config.crossfade());
                previous = Some(track);
            } else {
                track.fade_out(session.config.stop_fade());
                wait_for_silence(&track, session.config.stop_fade());
            }
        }

        if advance.load(Ordering::SeqCst) >= threshold {
            println!("{}", "Interrupted; stopping".yellow());
            break 'tracks;
        }
    }

    if let Some(prev) = previous.take() {
        wait_for_silence(&prev, session.config.crossfade());
    }
    Ok(code)
}

fn clamp_multi(files: &[PathBuf]) -> &[PathBuf] {
    if files.len() > MAX_MULTI_TRACKS {
        &files[..MAX_MULTI_TRACKS]
    } else {
        files
    }
}

fn fade_out_all(session: &Session, tracks: &[Track]) {
    for track in tracks {
        track.fade_out(session.config.stop_fade());
    }
    let deadline = Instant::now() + session.config.stop_fade() + TICK;
    while tracks.iter().any(Track::is_playing) && Instant::now() < deadline {
        thread::sleep(TICK);
    }
    for track in tracks {
        track.halt();
    }
}

fn wait_for_silence(track: &Track, fade: Duration) {
    let deadline = Instant::now() + fade + TICK;
    while track.is_playing() && Instant::now() < deadline {
        thread::sleep(TICK);
    }
    track.halt();
}

/// One round of the text command menu. Returns true when the sequential
/// loop should leave the current track.
fn pump_command_menu(session: &Session, track: &Track) -> Result<bool, Box<dyn Error>> {
    println!("Available commands: (p)ause (r)esume (h)alt volume(v#) (n)ext");
    println!(
        "Music playing: {} Paused: {}",
        if track.is_playing() { "yes" } else { "no" },
        if track.is_paused() { "yes" } else { "no" },
    );
    let line: String = match Input::with_theme(&ColorfulTheme::default())
        .with_prompt(">")
        .allow_empty(true)
        .interact_text()
    {
        Ok(line) => line,
        Err(_) => {
            // Closed or interrupted stdin both mean "move on"; a raised
            // signal is already in the counter
            thread::sleep(TICK);
            return Ok(true);
        }
    };
    match line.trim() {
        "p" => track.pause(),
        "r" => track.resume(),
        "h" => {
            track.halt();
            return Ok(true);
        }
        "n" => return Ok(true),
        cmd if cmd.starts_with('v') => match cmd[1..].trim().parse::<u32>() {
            Ok(volume) => session.mixer.set_volume(volume),
            Err(_) => println!("{}", "volume wants v<0-128>".yellow()),
        },
        "" => {}
        other => println!("{} {other}", "unknown command:".yellow()),
    }
    Ok(false)
}

fn report_position(track: &Track) -> Result<(), Box<dyn Error>> {
    let clock = match track.duration() {
        Some(total) => format!(
            "{} / {}",
            format_position(track.position()),
            format_clock(total)
        ),
        None => format_position(track.position()),
    };
    print!("\r{} {clock}   ", "Position:".cyan());
    io::stdout().flush()?;
    Ok(())
}

fn format_position(time: Duration) -> String {
    let secs = time.as_secs();
    format!(
        "{:02}:{:02}.{}",
        secs / 60,
        secs % 60,
        time.subsec_millis() / 100
    )
}

fn format_clock(time: Duration) -> String {
    let secs = time.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}
