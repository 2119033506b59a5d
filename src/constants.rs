//! Project-wide constants used across multiple modules.
//!
//! This module centralizes constant definitions to avoid duplication and ensure
//! consistency across the codebase.

use std::time::Duration;

/// Maximum number of entries a directory scan will keep
pub const MAX_TRACKS: usize = 255;

/// Maximum kept length of a track file name, in characters
pub const MAX_TRACK_NAME: usize = 63;

/// Number of list rows visible in the playlist menu window
pub const MENU_PAGE_LEN: usize = 7;

/// Maximum number of tracks loadable at once in simultaneous mode
pub const MAX_MULTI_TRACKS: usize = 20;

/// Cross-fade duration between the previous and the next track
pub const CROSSFADE: Duration = Duration::from_millis(5000);

/// Fade-in duration for a fresh (non-cross-faded) start
pub const FADE_IN: Duration = Duration::from_millis(2000);

/// Fade-out applied to whatever is still playing at shutdown
pub const STOP_FADE: Duration = Duration::from_millis(1500);

/// Poll interval for the menu loop and the position reports
pub const TICK: Duration = Duration::from_millis(100);

/// Volume scale ceiling; CLI volumes and the text menu use 0..=128
pub const MAX_VOLUME: u32 = 128;

/// Default device request when no flags override it
pub const DEFAULT_RATE: u32 = 44100;
pub const DEFAULT_CHANNELS: u16 = 2;
pub const DEFAULT_BUFFERS: u32 = 4096;

/// Sound-effect chunk file names looked up under the sfx directory
pub const SFX_CHUNKS: &[&str] = &["sndIncFile.wav", "sndOnline.wav"];

/// Process exit codes
pub const EXIT_OK: u8 = 0;
pub const EXIT_USAGE: u8 = 1;
pub const EXIT_AUDIO: u8 = 2;
pub const EXIT_INIT: u8 = 255;

/// Log file written by the player (the TUI owns the terminal)
pub const LOG_FILE: &str = "mixplay.log";
