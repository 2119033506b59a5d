//! Preloaded short sound effects.
//!
//! Chunks are read fully into memory at load time and decoded fresh on every
//! play, so triggering one never touches the filesystem.

use rodio::{Decoder, Source};
use std::error::Error;
use std::io::Cursor;
use std::path::Path;

pub struct Chunk {
    name: String,
    bytes: Vec<u8>,
}

impl Chunk {
    /// Read a chunk into memory. Decoding is attempted once up front so a
    /// bad file fails here instead of at play time.
    pub fn load(path: &Path) -> Result<Self, Box<dyn Error>> {
        let bytes = std::fs::read(path)?;
        Decoder::new(Cursor::new(bytes.clone()))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn source(
        &self,
    ) -> Result<impl Source<Item = f32> + Send + 'static, Box<dyn Error>> {
        Ok(Decoder::new(Cursor::new(self.bytes.clone()))?.convert_samples::<f32>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_wav(dir: &TempDir, name: &str, frames: u32) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..frames {
            writer.write_sample((i % 64) as i16 * 256).unwrap();
        }
        writer.finalize().unwrap();
        path
    }

    #[test]
    fn test_load_and_decode() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "blip.wav", 800);

        let chunk = Chunk::load(&path).unwrap();
        assert_eq!(chunk.name(), "blip.wav");

        let samples: Vec<f32> = chunk.source().unwrap().collect();
        assert_eq!(samples.len(), 800);
    }

    #[test]
    fn test_source_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let path = write_wav(&dir, "blip.wav", 100);
        let chunk = Chunk::load(&path).unwrap();

        let first: Vec<f32> = chunk.source().unwrap().collect();
        let second: Vec<f32> = chunk.source().unwrap().collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_load_rejects_non_audio() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not a wav").unwrap();
        assert!(Chunk::load(&path).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(Chunk::load(&dir.path().join("absent.wav")).is_err());
    }
}
