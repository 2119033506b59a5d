//! Music format detection and tag probing.
//!
//! Format detection reads magic bytes directly so a recognized-but-undecodable
//! file still logs a sensible type name before the load error. Tags, duration
//! and loop points come from a symphonia probe.

use std::error::Error;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::Hint;

/// Music types the player can name in its logs.
///
/// Detection is independent of decode support; the decode registry is
/// narrower than this list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MusicType {
    Cmd,
    Wav,
    Mod,
    Midi,
    OggVorbis,
    Mp3,
    Flac,
    Opus,
    Unknown,
}

impl MusicType {
    pub fn name(&self) -> &'static str {
        match self {
            MusicType::Cmd => "CMD",
            MusicType::Wav => "WAV",
            MusicType::Mod => "MOD",
            MusicType::Midi => "MIDI",
            MusicType::OggVorbis => "OGG Vorbis",
            MusicType::Mp3 => "MP3",
            MusicType::Flac => "FLAC",
            MusicType::Opus => "OPUS",
            MusicType::Unknown => "NONE",
        }
    }
}

/// Tracker-module magics found at offset 1080 in Amiga MOD files
const MOD_MAGICS: &[&[u8; 4]] = &[b"M.K.", b"M!K!", b"FLT4", b"FLT8", b"4CHN", b"6CHN", b"8CHN"];

/// Identify a music type from the first bytes of a file.
///
/// `bytes` should hold at least the first 1084 bytes when available; shorter
/// buffers simply fail the checks that need the missing offsets.
pub fn sniff(bytes: &[u8]) -> MusicType {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" {
        if &bytes[8..12] == b"WAVE" {
            return MusicType::Wav;
        }
        if &bytes[8..12] == b"RMID" {
            return MusicType::Midi;
        }
    }
    if bytes.len() >= 4 && &bytes[0..4] == b"fLaC" {
        return MusicType::Flac;
    }
    if bytes.len() >= 4 && &bytes[0..4] == b"MThd" {
        return MusicType::Midi;
    }
    if bytes.len() >= 4 && &bytes[0..4] == b"OggS" {
        // The first page payload starts right after the 27-byte header and
        // segment table; a windowed scan is enough to tell the codecs apart.
        let window = &bytes[..bytes.len().min(128)];
        if find(window, b"OpusHead") {
            return MusicType::Opus;
        }
        if find(window, b"vorbis") {
            return MusicType::OggVorbis;
        }
        return MusicType::OggVorbis;
    }
    if bytes.len() >= 3 && &bytes[0..3] == b"ID3" {
        return MusicType::Mp3;
    }
    if bytes.len() >= 2 && bytes[0] == 0xFF && (bytes[1] & 0xE0) == 0xE0 {
        return MusicType::Mp3;
    }
    if bytes.len() >= 17 && &bytes[0..17] == b"Extended Module: " {
        return MusicType::Mod;
    }
    if bytes.len() >= 4 && &bytes[0..4] == b"IMPM" {
        return MusicType::Mod;
    }
    if bytes.len() >= 48 && &bytes[44..48] == b"SCRM" {
        return MusicType::Mod;
    }
    if bytes.len() >= 1084 {
        let magic: &[u8] = &bytes[1080..1084];
        if MOD_MAGICS.iter().any(|m| magic == &m[..]) {
            return MusicType::Mod;
        }
    }
    MusicType::Unknown
}

/// Detect the music type of a file on disk.
pub fn detect_file(path: &Path) -> Result<MusicType, Box<dyn Error>> {
    let mut file = File::open(path)?;
    let mut bytes = vec![0u8; 1084];
    let mut filled = 0;
    // A short file is not an error for detection purposes
    while filled < bytes.len() {
        let n = file.read(&mut bytes[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    bytes.truncate(filled);
    Ok(sniff(&bytes))
}

fn find(haystack: &[u8], needle: &[u8]) -> bool {
    haystack
        .windows(needle.len())
        .any(|window| window == needle)
}

/// Loop points in seconds, resolved from LOOPSTART/LOOPEND/LOOPLENGTH tags.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopPoints {
    pub start: f64,
    pub end: f64,
    pub length: f64,
}

#[derive(Debug, Default)]
pub struct TrackMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub copyright: Option<String>,
    pub duration: Option<Duration>,
    pub loop_points: Option<LoopPoints>,
}

/// Raw loop tag values in sample frames, before rate conversion.
#[derive(Debug, Default, Clone, Copy)]
struct RawLoops {
    start: Option<u64>,
    end: Option<u64>,
    length: Option<u64>,
}

impl RawLoops {
    /// Resolve missing end/length from each other the way taggers expect:
    /// LOOPLENGTH counts from LOOPSTART, LOOPEND is absolute.
    fn resolve(self, sample_rate: u32) -> Option<LoopPoints> {
        let rate = f64::from(sample_rate);
        if rate <= 0.0 {
            return None;
        }
        let start = self.start?;
        let end = self.end.or(self.length.map(|len| start + len))?;
        let length = end.saturating_sub(start);
        Some(LoopPoints {
            start: start as f64 / rate,
            end: end as f64 / rate,
            length: length as f64 / rate,
        })
    }
}

/// Probe a file for tags, duration and loop points.
pub fn probe(path: &Path) -> Result<TrackMetadata, Box<dyn Error>> {
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut meta = TrackMetadata::default();
    let mut raw_loops = RawLoops::default();

    let mut sample_rate = 0u32;
    if let Some(track) = probed.format.default_track() {
        let params = &track.codec_params;
        if let Some(rate) = params.sample_rate {
            sample_rate = rate;
            if let Some(frames) = params.n_frames {
                meta.duration = Some(Duration::from_secs_f64(frames as f64 / f64::from(rate)));
            }
        }
    }

    // Tags can live in the container (ID3v2 found during probe) or in the
    // format reader (vorbis comments). Collect both, reader wins.
    let container_meta = probed.metadata.get();
    if let Some(rev) = container_meta.as_ref().and_then(|m| m.current()) {
        collect_tags(rev, &mut meta, &mut raw_loops);
    }
    {
        let mut reader_meta = probed.format.metadata();
        if let Some(rev) = reader_meta.skip_to_latest() {
            collect_tags(rev, &mut meta, &mut raw_loops);
        }
    }

    meta.loop_points = raw_loops.resolve(sample_rate);
    Ok(meta)
}

fn collect_tags(rev: &MetadataRevision, meta: &mut TrackMetadata, loops: &mut RawLoops) {
    for tag in rev.tags() {
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) => meta.title = Some(tag.value.to_string()),
            Some(StandardTagKey::Artist) => meta.artist = Some(tag.value.to_string()),
            Some(StandardTagKey::Album) => meta.album = Some(tag.value.to_string()),
            Some(StandardTagKey::Copyright) => meta.copyright = Some(tag.value.to_string()),
            _ => {
                let value = tag.value.to_string();
                match tag.key.to_ascii_uppercase().as_str() {
                    "LOOPSTART" => loops.start = value.parse().ok(),
                    "LOOPEND" => loops.end = value.parse().ok(),
                    "LOOPLENGTH" => loops.length = value.parse().ok(),
                    _ => {}
                }
            }
        }
    }
}
