//! Playback modes and the shared session state they run against.

pub mod driver;
pub mod input;
pub mod menu;
pub mod playlist;
pub mod ui;

use crate::config::Config;
use crate::mixer::{EchoToggle, Mixer, Track};
use log::info;
use std::error::Error;
use std::path::Path;

/// State every playback mode shares: the open mixer, the echo toggle and
/// the loader choice. Modes borrow the session for their whole run.
pub struct Session {
    pub config: Config,
    pub mixer: Mixer,
    pub echo: EchoToggle,
    /// Read whole files into memory before decoding instead of streaming.
    pub preload: bool,
    /// External player command; set when `MUSIC_CMD` is in the environment.
    pub music_cmd: Option<String>,
}

impl Session {
    pub fn new(config: Config, mixer: Mixer, preload: bool, music_cmd: Option<String>) -> Self {
        Self {
            config,
            mixer,
            echo: EchoToggle::new(),
            preload,
            music_cmd,
        }
    }

    pub fn load_track(&self, path: &Path, looping: bool) -> Result<Track, Box<dyn Error>> {
        self.mixer
            .load(path, looping, self.preload, self.music_cmd.as_deref())
    }

    /// Human-readable lines describing a loaded track: detected type, the
    /// tags that were present, and loop points when the file carries them.
    pub fn track_summary(&self, track: &Track) -> Vec<String> {
        let mut lines = vec![format!("Detected music type: {}", track.music_type().name())];
        if let Some(meta) = track.metadata() {
            if let Some(title) = &meta.title {
                lines.push(format!("Title: {title}"));
            }
            if let Some(artist) = &meta.artist {
                lines.push(format!("Artist: {artist}"));
            }
            if let Some(album) = &meta.album {
                lines.push(format!("Album: {album}"));
            }
            if let Some(copyright) = &meta.copyright {
                lines.push(format!("Copyright: {copyright}"));
            }
            if let Some(lp) = &meta.loop_points {
                lines.push(format!(
                    "Loop points: start {:.2} s, end {:.2} s, length {:.2} s",
                    lp.start, lp.end, lp.length
                ));
            }
        }
        lines
    }

    /// Same summary, routed to the log for modes that own the terminal.
    pub fn log_track(&self, track: &Track) {
        for line in self.track_summary(track) {
            info!("{line}");
        }
    }

    /// Stop the master output and release the device.
    pub fn close(self) {
        self.mixer.close();
    }
}
