//! The mixing engine the player drives.
//!
//! One `Mixer` owns the output stream: every loaded track and fired chunk is
//! summed on a single master bus, the post-mix effect chain runs over the
//! combined blocks, and a master sink applies the global volume. Track
//! handles stay valid after the mixer is gone; they just go silent.

pub mod bus;
pub mod chunk;
pub mod echo;
pub mod fx;
pub mod metadata;
pub mod track;

pub use chunk::Chunk;
pub use echo::{EchoEffect, EchoParams, EchoToggle};
pub use fx::{FxChain, PostEffect};
pub use metadata::{LoopPoints, MusicType, TrackMetadata};
pub use track::{StreamTrack, Track};

use crate::constants::{DEFAULT_BUFFERS, DEFAULT_CHANNELS, DEFAULT_RATE, MAX_VOLUME};
use bus::BusController;
use log::{debug, info, warn};
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::cpal::{self, SampleRate, SupportedStreamConfig};
use rodio::{OutputStream, Sink};
use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Device sample formats the player can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    U8,
    S16,
    F32,
}

impl SampleFormat {
    pub fn bits(&self) -> u16 {
        match self {
            SampleFormat::U8 => 8,
            SampleFormat::S16 => 16,
            SampleFormat::F32 => 32,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SampleFormat::U8 => "U8",
            SampleFormat::S16 => "S16",
            SampleFormat::F32 => "F32",
        }
    }

    fn to_cpal(self) -> cpal::SampleFormat {
        match self {
            SampleFormat::U8 => cpal::SampleFormat::U8,
            SampleFormat::S16 => cpal::SampleFormat::I16,
            SampleFormat::F32 => cpal::SampleFormat::F32,
        }
    }

    fn from_cpal(format: cpal::SampleFormat) -> Self {
        match format {
            cpal::SampleFormat::U8 => SampleFormat::U8,
            cpal::SampleFormat::F32 | cpal::SampleFormat::F64 => SampleFormat::F32,
            _ => SampleFormat::S16,
        }
    }
}

/// What the command line asked the device for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRequest {
    pub rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub buffers: u32,
}

impl Default for DeviceRequest {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            channels: DEFAULT_CHANNELS,
            format: SampleFormat::S16,
            buffers: DEFAULT_BUFFERS,
        }
    }
}

/// The negotiated output layout everything downstream works in.
///
/// `buffers` carries the requested buffer size: the stream layer picks its
/// own buffering and does not expose a query for the real value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputSpec {
    pub rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
    pub buffers: u32,
}

/// An output device picked by `Mixer::default_device`.
pub struct AudioDevice(cpal::Device);

pub struct Mixer {
    master: Sink,
    controller: BusController,
    chain: Arc<FxChain>,
    spec: OutputSpec,
    volume: AtomicU32,
    _stream: OutputStream,
}

impl Mixer {
    /// Find the default output device. Failure here means the audio stack
    /// itself is unusable, as opposed to a stream-open failure.
    pub fn default_device() -> Result<AudioDevice, Box<dyn Error>> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or("no audio output device available")?;
        if let Ok(name) = device.name() {
            debug!("output device: {name}");
        }
        Ok(AudioDevice(device))
    }

    pub fn open(device: AudioDevice, request: &DeviceRequest) -> Result<Mixer, Box<dyn Error>> {
        let AudioDevice(device) = device;
        let config = negotiate(&device, request)?;
        let spec = OutputSpec {
            rate: config.sample_rate().0,
            channels: config.channels(),
            format: SampleFormat::from_cpal(config.sample_format()),
            buffers: request.buffers,
        };
        if spec.rate != request.rate
            || spec.channels != request.channels
            || spec.format != request.format
        {
            warn!(
                "device declined {} Hz {} ({}); using {} Hz {} ({})",
                request.rate,
                describe_channels(request.channels),
                request.format.name(),
                spec.rate,
                describe_channels(spec.channels),
                spec.format.name(),
            );
        }

        let (stream, handle) = OutputStream::try_from_device_config(&device, config)?;
        let chain = Arc::new(FxChain::new());
        let (controller, bus) = bus::mix_bus(spec, chain.clone());
        let master = Sink::try_new(&handle)?;
        master.append(bus);

        info!(
            "Opened audio at {} Hz {} bit {} ({}), {} frames audio buffer",
            spec.rate,
            spec.format.bits(),
            describe_channels(spec.channels),
            spec.format.name(),
            spec.buffers,
        );

        Ok(Mixer {
            master,
            controller,
            chain,
            spec,
            volume: AtomicU32::new(MAX_VOLUME),
            _stream: stream,
        })
    }

    pub fn spec(&self) -> OutputSpec {
        self.spec
    }

    pub fn chain(&self) -> &FxChain {
        &self.chain
    }

    /// Load a music file as a new track, initially silent until played.
    /// A non-empty `music_cmd` delegates playback to that external command.
    pub fn load(
        &self,
        path: &Path,
        looping: bool,
        preload: bool,
        music_cmd: Option<&str>,
    ) -> Result<Track, Box<dyn Error>> {
        if let Some(cmd) = music_cmd
            && !cmd.trim().is_empty()
        {
            if !path.exists() {
                return Err(format!("{}: no such file", path.display()).into());
            }
            debug!("delegating {} to external command", path.display());
            return Ok(Track::External(track::ExternalTrack::new(
                cmd.to_string(),
                path,
            )));
        }
        Ok(Track::Stream(track::load_stream(
            &self.controller,
            path,
            looping,
            preload,
        )?))
    }

    /// Fire a preloaded chunk through the bus at full volume.
    pub fn play_chunk(&self, chunk: &Chunk) {
        match chunk.source() {
            Ok(source) => {
                self.controller.add(source);
                debug!("chunk fired: {}", chunk.name());
            }
            Err(e) => warn!("could not play chunk {}: {e}", chunk.name()),
        }
    }

    /// Master volume on the 0..=128 scale.
    pub fn set_volume(&self, volume: u32) {
        let clamped = volume.min(MAX_VOLUME);
        self.volume.store(clamped, Ordering::Relaxed);
        self.master.set_volume(clamped as f32 / MAX_VOLUME as f32);
    }

    pub fn volume(&self) -> u32 {
        self.volume.load(Ordering::Relaxed)
    }

    /// Stop the master sink and release the device.
    pub fn close(self) {
        self.master.stop();
    }
}

fn describe_channels(channels: u16) -> String {
    match channels {
        1 => "mono".to_string(),
        2 => "stereo".to_string(),
        4 => "quad".to_string(),
        6 => "5.1 surround".to_string(),
        8 => "7.1 surround".to_string(),
        n => format!("{n} channels"),
    }
}

/// Pick a supported stream config honoring the request where the device
/// allows, preferring an exact sample-format match, then the requested
/// rate/channel pair in any format, then the device default.
fn negotiate(
    device: &cpal::Device,
    request: &DeviceRequest,
) -> Result<SupportedStreamConfig, Box<dyn Error>> {
    let wanted = request.format.to_cpal();
    if let Ok(ranges) = device.supported_output_configs() {
        let ranges: Vec<_> = ranges.collect();
        for format_must_match in [true, false] {
            for range in &ranges {
                if range.channels() != request.channels {
                    continue;
                }
                if format_must_match && range.sample_format() != wanted {
                    continue;
                }
                if request.rate < range.min_sample_rate().0
                    || request.rate > range.max_sample_rate().0
                {
                    continue;
                }
                return Ok(range.clone().with_sample_rate(SampleRate(request.rate)));
            }
        }
    }
    Ok(device.default_output_config()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_ci_environment() -> bool {
        std::env::var("CI").is_ok() || std::env::var("GITHUB_ACTIONS").is_ok()
    }

    #[test]
    fn test_sample_format_bits_and_names() {
        assert_eq!(SampleFormat::U8.bits(), 8);
        assert_eq!(SampleFormat::S16.bits(), 16);
        assert_eq!(SampleFormat::F32.bits(), 32);
        assert_eq!(SampleFormat::S16.name(), "S16");
    }

    #[test]
    fn test_sample_format_cpal_round_trip() {
        for format in [SampleFormat::U8, SampleFormat::S16, SampleFormat::F32] {
            assert_eq!(SampleFormat::from_cpal(format.to_cpal()), format);
        }
        // Unmodeled device formats collapse onto 16-bit
        assert_eq!(
            SampleFormat::from_cpal(cpal::SampleFormat::U16),
            SampleFormat::S16
        );
    }

    #[test]
    fn test_describe_channels() {
        assert_eq!(describe_channels(1), "mono");
        assert_eq!(describe_channels(2), "stereo");
        assert_eq!(describe_channels(4), "quad");
        assert_eq!(describe_channels(3), "3 channels");
    }

    #[test]
    fn test_device_request_default() {
        let request = DeviceRequest::default();
        assert_eq!(request.rate, 44100);
        assert_eq!(request.channels, 2);
        assert_eq!(request.format, SampleFormat::S16);
        assert_eq!(request.buffers, 4096);
    }

    #[test]
    fn test_open_default_device() {
        if is_ci_environment() {
            println!("Skipping audio device test in CI");
            return;
        }
        let Ok(device) = Mixer::default_device() else {
            println!("Skipping: no output device");
            return;
        };
        let Ok(mixer) = Mixer::open(device, &DeviceRequest::default()) else {
            println!("Skipping: device open failed");
            return;
        };

        assert!(mixer.spec().rate > 0);
        assert!(mixer.spec().channels > 0);

        mixer.set_volume(64);
        assert_eq!(mixer.volume(), 64);
        // Values above the scale clamp
        mixer.set_volume(1000);
        assert_eq!(mixer.volume(), 128);

        mixer.close();
    }
}
