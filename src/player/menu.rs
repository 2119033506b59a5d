//! Interactive playlist mode: a full-screen menu over the music directory.
//!
//! The selected track plays looped; picking another track cross-fades the
//! old one out while the new one fades in. Tracks fading out keep playing
//! until the fade lands, then their decoders are dropped.

use crossterm::{
    event, execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use log::{info, warn};
use ratatui::{Terminal, backend::CrosstermBackend};
use std::error::Error;
use std::io;

use super::Session;
use super::input::{Command, EdgeDetector, InputSource, TerminalInput};
use super::playlist::{MenuWindow, TrackList};
use super::ui::{self, MenuScreen};
use crate::constants::{SFX_CHUNKS, TICK};
use crate::mixer::{Chunk, Track};

pub fn run(session: &mut Session) -> Result<(), Box<dyn Error>> {
    let music_dir = session.config.music_path();
    let tracks = TrackList::scan(&music_dir);
    if tracks.is_empty() {
        return Err(format!("no tracks under {}", music_dir.display()).into());
    }
    info!("menu over {} tracks from {}", tracks.len(), music_dir.display());
    let chunks = load_chunks(session);

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut input = TerminalInput::new();
    let res = run_menu(&mut terminal, &mut input, session, &tracks, &chunks);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    if let Err(e) = &res {
        eprintln!("Error: {e}");
    }
    res
}

fn run_menu<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    input: &mut dyn InputSource,
    session: &mut Session,
    tracks: &TrackList,
    chunks: &[Option<Chunk>],
) -> Result<(), Box<dyn Error>> {
    let mut window = MenuWindow::new(tracks.len());
    let mut edges = EdgeDetector::new();
    let mut current: Option<Track> = None;
    let mut fading: Vec<Track> = Vec::new();

    loop {
        fading.retain(Track::is_playing);
        // An external player process can end on its own
        if let Some(track) = &current
            && !track.is_playing()
            && !track.is_paused()
        {
            current = None;
        }

        terminal.draw(|f| {
            let screen = MenuScreen {
                tracks,
                window: &window,
                playing: current.as_ref().map(Track::name),
                position: current
                    .as_ref()
                    .map(Track::position)
                    .unwrap_or_default(),
                duration: current.as_ref().and_then(Track::duration),
                echo_on: session.echo.is_enabled(),
                preload_on: session.preload,
                volume: session.mixer.volume(),
            };
            ui::draw(f, &screen)
        })?;

        // Wake early on a keypress, otherwise tick
        event::poll(TICK)?;
        let pressed = edges.pressed(input.sample()?);

        if pressed.contains(Command::QUIT) {
            break;
        }
        if pressed.contains(Command::UP) {
            window.move_up();
        }
        if pressed.contains(Command::DOWN) {
            window.move_down();
        }
        if pressed.contains(Command::LEFT) {
            let volume = session.mixer.volume();
            session.mixer.set_volume(volume.saturating_sub(8));
        }
        if pressed.contains(Command::RIGHT) {
            session.mixer.set_volume(session.mixer.volume() + 8);
        }
        if pressed.contains(Command::PLAY) {
            play_selected(session, tracks, &window, &mut current, &mut fading);
        }
        if pressed.contains(Command::STOP)
            && let Some(track) = current.take()
        {
            track.fade_out(session.config.stop_fade());
            fading.push(track);
        }
        if pressed.contains(Command::TOGGLE_ECHO) {
            let spec = session.mixer.spec();
            session.echo.toggle(session.mixer.chain(), spec);
        }
        if pressed.contains(Command::TOGGLE_LOADER) {
            session.preload = !session.preload;
            info!(
                "track loader: {}",
                if session.preload { "memory" } else { "file" }
            );
        }
        if pressed.contains(Command::PLAY_SFX1)
            && let Some(chunk) = &chunks[0]
        {
            session.mixer.play_chunk(chunk);
        }
        if pressed.contains(Command::PLAY_SFX2)
            && let Some(chunk) = &chunks[1]
        {
            session.mixer.play_chunk(chunk);
        }
    }

    // Wind down: fade the current track out, then release the effect
    if let Some(track) = current.take() {
        track.fade_out(session.config.stop_fade());
        fading.push(track);
    }
    let deadline = std::time::Instant::now() + session.config.stop_fade() + TICK;
    while fading.iter().any(Track::is_playing) && std::time::Instant::now() < deadline {
        std::thread::sleep(TICK);
    }
    for track in fading.drain(..) {
        track.halt();
    }
    session.echo.disable(session.mixer.chain());
    Ok(())
}

/// Start the track under the cursor, cross-fading from whatever plays now.
fn play_selected(
    session: &mut Session,
    tracks: &TrackList,
    window: &MenuWindow,
    current: &mut Option<Track>,
    fading: &mut Vec<Track>,
) {
    let Some(entry) = tracks.get(window.cursor()) else {
        return;
    };

    // The first track starts at full level; replacements cross-fade in
    let ramp = match current.take() {
        Some(old) => {
            old.fade_out(session.config.crossfade());
            fading.push(old);
            Some(session.config.crossfade())
        }
        None => None,
    };

    match session.load_track(entry.path(), true) {
        Ok(track) => {
            session.log_track(&track);
            if let Err(e) = track.play(ramp) {
                warn!("could not start {}: {e}", entry.name());
                return;
            }
            *current = Some(track);
        }
        Err(e) => warn!("could not load {}: {e}", entry.name()),
    }
}

/// Fetch the effect chunks from the sfx directory. A missing chunk only
/// logs; the menu runs fine without them.
fn load_chunks(session: &Session) -> Vec<Option<Chunk>> {
    let sfx_dir = session.config.sfx_path();
    SFX_CHUNKS
        .iter()
        .map(|name| match Chunk::load(&sfx_dir.join(name)) {
            Ok(chunk) => Some(chunk),
            Err(e) => {
                warn!("sfx chunk {name}: {e}");
                None
            }
        })
        .collect()
}
