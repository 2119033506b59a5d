//! Application configuration management.
//!
//! This module handles the persistent configuration for mixplay: the music
//! directory the playlist menu scans, fade and cross-fade durations, and the
//! skip-abort threshold for the advance signal. Configuration is stored in the
//! user's config directory (typically ~/.config/mixplay/config.toml).

use crate::constants::{CROSSFADE, FADE_IN, STOP_FADE};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_music_dir")]
    pub music_dir: String,
    #[serde(default = "default_sfx_dir")]
    pub sfx_dir: String,
    #[serde(default = "default_crossfade_ms")]
    pub crossfade_ms: u64,
    #[serde(default = "default_fade_in_ms")]
    pub fade_in_ms: u64,
    #[serde(default = "default_stop_fade_ms")]
    pub stop_fade_ms: u64,
    #[serde(default = "default_skip_abort_threshold")]
    pub skip_abort_threshold: u32,
}

fn default_music_dir() -> String {
    // Prefer the XDG music dir when the platform knows one
    dirs::audio_dir()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| "~/Music".to_string())
}

fn default_sfx_dir() -> String {
    format!("{}/sfx", default_music_dir())
}

fn default_crossfade_ms() -> u64 {
    CROSSFADE.as_millis() as u64
}

fn default_fade_in_ms() -> u64 {
    FADE_IN.as_millis() as u64
}

fn default_stop_fade_ms() -> u64 {
    STOP_FADE.as_millis() as u64
}

fn default_skip_abort_threshold() -> u32 {
    2
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            music_dir: default_music_dir(),
            sfx_dir: default_sfx_dir(),
            crossfade_ms: default_crossfade_ms(),
            fade_in_ms: default_fade_in_ms(),
            stop_fade_ms: default_stop_fade_ms(),
            skip_abort_threshold: default_skip_abort_threshold(),
        }
    }

    pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
        // Check for XDG_CONFIG_HOME first (useful for testing)
        let config_dir = if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(xdg_config).join("mixplay")
        } else {
            dirs::config_dir()
                .ok_or("Unable to find config directory")?
                .join("mixplay")
        };
        Ok(config_dir)
    }

    pub fn config_path() -> Result<PathBuf, Box<dyn Error>> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn load() -> Result<Self, Box<dyn Error>> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            // Return default config instead of error
            return Ok(Default::default());
        }

        let contents = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<(), Box<dyn Error>> {
        let config_dir = Self::config_dir()?;

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir)?;
        }

        let config_path = Self::config_path()?;
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(&config_path, toml_string)?;

        Ok(())
    }

    pub fn exists() -> Result<bool, Box<dyn Error>> {
        Ok(Self::config_path()?.exists())
    }

    /// Music directory with `~` expanded
    pub fn music_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.music_dir).as_ref())
    }

    /// Sound-effect directory with `~` expanded
    pub fn sfx_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.sfx_dir).as_ref())
    }

    pub fn crossfade(&self) -> Duration {
        Duration::from_millis(self.crossfade_ms)
    }

    pub fn fade_in(&self) -> Duration {
        Duration::from_millis(self.fade_in_ms)
    }

    pub fn stop_fade(&self) -> Duration {
        Duration::from_millis(self.stop_fade_ms)
    }

    pub fn set_value(&mut self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        match key {
            "music_dir" => self.music_dir = value.to_string(),
            "sfx_dir" => self.sfx_dir = value.to_string(),
            "crossfade_ms" => {
                self.crossfade_ms = value
                    .parse::<u64>()
                    .map_err(|_| "Value must be a duration in milliseconds")?;
            }
            "fade_in_ms" => {
                self.fade_in_ms = value
                    .parse::<u64>()
                    .map_err(|_| "Value must be a duration in milliseconds")?;
            }
            "stop_fade_ms" => {
                self.stop_fade_ms = value
                    .parse::<u64>()
                    .map_err(|_| "Value must be a duration in milliseconds")?;
            }
            "skip_abort_threshold" => {
                self.skip_abort_threshold = value
                    .parse::<u32>()
                    .map_err(|_| "Value must be a positive signal count")?;
            }
            _ => return Err(format!("Unknown configuration key: {key}").into()),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::TempDir;

    // Use a mutex to ensure tests that modify environment variables don't run concurrently
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_config_new() {
        let config = Config::new();
        assert_eq!(config.crossfade_ms, 5000);
        assert_eq!(config.fade_in_ms, 2000);
        assert_eq!(config.stop_fade_ms, 1500);
        assert_eq!(config.skip_abort_threshold, 2);
        assert!(!config.music_dir.is_empty());
    }

    #[test]
    fn test_config_default() {
        let config: Config = Default::default();
        assert_eq!(config.crossfade_ms, default_crossfade_ms());
        assert_eq!(config.skip_abort_threshold, default_skip_abort_threshold());
    }

    #[test]
    fn test_music_path_expands_tilde() {
        let mut config = Config::new();
        config.music_dir = "~/Music".to_string();
        let path = config.music_path();
        assert!(!path.to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_durations() {
        let config = Config::new();
        assert_eq!(config.crossfade(), Duration::from_millis(5000));
        assert_eq!(config.fade_in(), Duration::from_millis(2000));
        assert_eq!(config.stop_fade(), Duration::from_millis(1500));
    }

    #[test]
    fn test_set_value() {
        let mut config = Config::new();

        config.set_value("music_dir", "/srv/music").unwrap();
        assert_eq!(config.music_dir, "/srv/music");

        config.set_value("crossfade_ms", "2500").unwrap();
        assert_eq!(config.crossfade_ms, 2500);

        config.set_value("skip_abort_threshold", "3").unwrap();
        assert_eq!(config.skip_abort_threshold, 3);

        // Non-numeric duration
        let result = config.set_value("crossfade_ms", "fast");
        assert!(result.is_err());

        // Unknown key
        let result = config.set_value("unknown_key", "value");
        assert!(result.is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let _guard = ENV_MUTEX.lock().unwrap();

        let temp_dir = TempDir::new().unwrap();
        let original_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
        }

        // Create a unique test config
        let mut config = Config::new();
        config.music_dir = "/srv/jukebox".to_string();
        config.crossfade_ms = 1234;
        config.save().unwrap();

        // Verify the config file was created in the temp directory
        let config_path = Config::config_path().unwrap();
        assert!(config_path.exists());

        // The path should be under temp_dir/mixplay/config.toml
        let expected_dir = temp_dir.path().join("mixplay");
        assert!(config_path.starts_with(&expected_dir));

        let loaded = Config::load().unwrap();
        assert_eq!(loaded.music_dir, "/srv/jukebox");
        assert_eq!(loaded.crossfade_ms, 1234);
        assert_eq!(loaded.fade_in_ms, default_fade_in_ms());

        // Clean up - restore original value if it existed
        unsafe {
            if let Some(original) = original_xdg {
                std::env::set_var("XDG_CONFIG_HOME", original);
            } else {
                std::env::remove_var("XDG_CONFIG_HOME");
            }
        }
    }

    #[test]
    fn test_config_exists() {
        let _guard = ENV_MUTEX.lock().unwrap();

        let temp_dir = TempDir::new().unwrap();
        let original_xdg = std::env::var("XDG_CONFIG_HOME").ok();
        unsafe {
            std::env::set_var("XDG_CONFIG_HOME", temp_dir.path());
        }

        // Verify we're checking in the temp directory
        let expected_path = temp_dir.path().join("mixplay").join("config.toml");
        assert!(!expected_path.exists());
        assert!(!Config::exists().unwrap());

        let config = Config::new();
        config.save().unwrap();

        assert!(expected_path.exists());
        assert!(Config::exists().unwrap());

        // Clean up - restore original value if it existed
        unsafe {
            if let Some(original) = original_xdg {
                std::env::set_var("XDG_CONFIG_HOME", original);
            } else {
                std::env::remove_var("XDG_CONFIG_HOME");
            }
        }
    }
}
