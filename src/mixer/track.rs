//! Track handles and the audio-thread source that drives them.
//!
//! A `Track` is the driver-side handle to one loaded piece of music. The
//! audio thread sees only the `TrackSource` wrapper, which applies gain,
//! pause and fade state read from a shared control block of atomics; no
//! locks on the sample path. When `MUSIC_CMD` is set, tracks delegate to an
//! external player process instead of the decode path.

use crate::constants::MAX_VOLUME;
use crate::mixer::bus::BusController;
use crate::mixer::metadata::{self, MusicType, TrackMetadata};
use log::{debug, warn};
use rodio::{Decoder, Source};
use std::error::Error;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Unity gain in the fixed-point milli scale the control atomics use
const UNITY: u32 = 1000;
const UNITY_F: f32 = 1000.0;

/// Fade ramp shared with the audio thread: factor moves `from` → `to` over
/// `len_samples` starting at `start_sample` of the track's sample counter.
#[derive(Debug)]
struct FadeProgram {
    active: AtomicBool,
    from_milli: AtomicU32,
    to_milli: AtomicU32,
    start_sample: AtomicUsize,
    len_samples: AtomicUsize,
    halt_at_end: AtomicBool,
}

/// State shared between a track handle and its source on the audio thread.
#[derive(Debug)]
pub struct TrackControl {
    gain_milli: AtomicU32,
    started: AtomicBool,
    paused: AtomicBool,
    halted: AtomicBool,
    finished: AtomicBool,
    samples: AtomicUsize,
    fade: FadeProgram,
}

impl TrackControl {
    fn new() -> Self {
        Self {
            gain_milli: AtomicU32::new(UNITY),
            started: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            samples: AtomicUsize::new(0),
            fade: FadeProgram {
                active: AtomicBool::new(false),
                from_milli: AtomicU32::new(UNITY),
                to_milli: AtomicU32::new(UNITY),
                start_sample: AtomicUsize::new(0),
                len_samples: AtomicUsize::new(0),
                halt_at_end: AtomicBool::new(false),
            },
        }
    }

    /// Install a new fade ramp starting at the current sample position.
    /// An in-flight fade is not cancelled, it is replaced.
    fn program_fade(&self, from: f32, to: f32, len_samples: usize, halt_at_end: bool) {
        self.fade
            .from_milli
            .store((from.clamp(0.0, 1.0) * UNITY_F).round() as u32, Ordering::Relaxed);
        self.fade
            .to_milli
            .store((to.clamp(0.0, 1.0) * UNITY_F).round() as u32, Ordering::Relaxed);
        self.fade
            .start_sample
            .store(self.samples.load(Ordering::Relaxed), Ordering::Relaxed);
        self.fade.len_samples.store(len_samples, Ordering::Relaxed);
        self.fade.halt_at_end.store(halt_at_end, Ordering::Relaxed);
        self.fade.active.store(true, Ordering::Release);
    }

    /// Fade factor at the given sample index, plus whether the ramp is done.
    fn fade_at(&self, at: usize) -> (f32, bool) {
        if !self.fade.active.load(Ordering::Acquire) {
            return (1.0, false);
        }
        let start = self.fade.start_sample.load(Ordering::Relaxed);
        let len = self.fade.len_samples.load(Ordering::Relaxed);
        let from = self.fade.from_milli.load(Ordering::Relaxed) as f32 / UNITY_F;
        let to = self.fade.to_milli.load(Ordering::Relaxed) as f32 / UNITY_F;

        let advanced = at.saturating_sub(start);
        if advanced >= len {
            (to, true)
        } else {
            let t = advanced as f32 / len as f32;
            (from + (to - from) * t, false)
        }
    }

    fn current_factor(&self) -> f32 {
        self.fade_at(self.samples.load(Ordering::Relaxed)).0
    }
}

/// Audio-side wrapper applying the control block to a decoded stream.
pub(crate) struct TrackSource<S> {
    inner: S,
    control: Arc<TrackControl>,
}

impl<S> TrackSource<S> {
    fn new(inner: S, control: Arc<TrackControl>) -> Self {
        Self { inner, control }
    }
}

impl<S> Iterator for TrackSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        let control = &self.control;
        if control.halted.load(Ordering::Relaxed) {
            control.finished.store(true, Ordering::Relaxed);
            return None;
        }
        // Keep the slot in the mix without consuming the stream, so pausing
        // holds position
        if !control.started.load(Ordering::Relaxed) || control.paused.load(Ordering::Relaxed) {
            return Some(0.0);
        }

        let at = control.samples.fetch_add(1, Ordering::Relaxed);
        let (factor, completed) = control.fade_at(at);
        if completed && control.fade.halt_at_end.load(Ordering::Relaxed) {
            control.finished.store(true, Ordering::Relaxed);
            return None;
        }

        match self.inner.next() {
            Some(sample) => {
                let gain = control.gain_milli.load(Ordering::Relaxed) as f32 / UNITY_F;
                Some(sample * gain * factor)
            }
            None => {
                control.finished.store(true, Ordering::Relaxed);
                None
            }
        }
    }
}

impl<S> Source for TrackSource<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }
}

/// A music stream mixed by this process.
pub struct StreamTrack {
    control: Arc<TrackControl>,
    name: String,
    rate: u32,
    channels: u16,
    duration: Option<Duration>,
    looping: bool,
    music_type: MusicType,
    metadata: TrackMetadata,
}

/// Load a file and attach its decoded stream to the bus, initially silent
/// until `play` is called.
///
/// `preload` reads the whole file into memory and decodes from the buffer
/// (the streaming-handle path); otherwise the decoder reads the file
/// directly.
pub(crate) fn load_stream(
    controller: &BusController,
    path: &Path,
    looping: bool,
    preload: bool,
) -> Result<StreamTrack, Box<dyn Error>> {
    let music_type = metadata::detect_file(path)?;
    let meta = metadata::probe(path).unwrap_or_else(|e| {
        debug!("tag probe failed for {}: {e}", path.display());
        TrackMetadata::default()
    });

    let control = Arc::new(TrackControl::new());
    let (rate, channels, decoded_duration) = if preload {
        let bytes = std::fs::read(path)?;
        debug!("preloaded {} bytes from {}", bytes.len(), path.display());
        attach(controller, Decoder::new(Cursor::new(bytes))?, &control, looping)
    } else {
        let file = BufReader::new(File::open(path)?);
        attach(controller, Decoder::new(file)?, &control, looping)
    };

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    let duration = decoded_duration.or(meta.duration);

    Ok(StreamTrack {
        control,
        name,
        rate,
        channels,
        duration,
        looping,
        music_type,
        metadata: meta,
    })
}

fn attach<R>(
    controller: &BusController,
    decoder: Decoder<R>,
    control: &Arc<TrackControl>,
    looping: bool,
) -> (u32, u16, Option<Duration>)
where
    R: Read + Seek + Send + Sync + 'static,
{
    let rate = decoder.sample_rate();
    let channels = decoder.channels();
    let duration = decoder.total_duration();

    if looping {
        let source = TrackSource::new(
            decoder.repeat_infinite().convert_samples::<f32>(),
            control.clone(),
        );
        controller.add(source);
    } else {
        let source = TrackSource::new(decoder.convert_samples::<f32>(), control.clone());
        controller.add(source);
    }

    (rate, channels, duration)
}

impl StreamTrack {
    fn fade_samples(&self, duration: Duration) -> usize {
        (duration.as_secs_f64() * f64::from(self.rate) * f64::from(self.channels.max(1))) as usize
    }

    pub fn play(&self, fade_in: Option<Duration>) {
        if let Some(duration) = fade_in
            && !duration.is_zero()
        {
            self.control
                .program_fade(0.0, 1.0, self.fade_samples(duration), false);
        }
        self.control.paused.store(false, Ordering::Relaxed);
        self.control.started.store(true, Ordering::Relaxed);
    }

    pub fn pause(&self) {
        self.control.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.control.paused.store(false, Ordering::Relaxed);
    }

    pub fn is_paused(&self) -> bool {
        self.control.started.load(Ordering::Relaxed) && self.control.paused.load(Ordering::Relaxed)
    }

    pub fn halt(&self) {
        self.control.halted.store(true, Ordering::Relaxed);
    }

    /// Ramp to silence over `duration`, then stop. The foreground should
    /// wait out the duration before dropping the handle if it wants the
    /// ramp audible.
    pub fn fade_out(&self, duration: Duration) {
        let from = self.control.current_factor();
        self.control
            .program_fade(from, 0.0, self.fade_samples(duration), true);
    }

    pub fn is_playing(&self) -> bool {
        self.control.started.load(Ordering::Relaxed)
            && !self.control.halted.load(Ordering::Relaxed)
            && !self.control.finished.load(Ordering::Relaxed)
    }

    pub fn set_volume(&self, volume: u32) {
        let clamped = volume.min(MAX_VOLUME);
        self.control
            .gain_milli
            .store(clamped * UNITY / MAX_VOLUME, Ordering::Relaxed);
    }

    pub fn volume(&self) -> u32 {
        self.control.gain_milli.load(Ordering::Relaxed) * MAX_VOLUME / UNITY
    }

    pub fn position(&self) -> Duration {
        let samples = self.control.samples.load(Ordering::Relaxed);
        let frames = samples / usize::from(self.channels.max(1));
        let mut secs = frames as f64 / f64::from(self.rate.max(1));
        if self.looping
            && let Some(total) = self.duration
            && total > Duration::ZERO
        {
            secs %= total.as_secs_f64();
        }
        Duration::from_secs_f64(secs)
    }

    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn music_type(&self) -> MusicType {
        self.music_type
    }

    pub fn metadata(&self) -> &TrackMetadata {
        &self.metadata
    }
}

impl Drop for StreamTrack {
    fn drop(&mut self) {
        // Freeing the handle stops the stream; the bus drops the source on
        // its next refill
        self.halt();
    }
}

/// A track delegated to the external player named by `MUSIC_CMD`.
pub struct ExternalTrack {
    command: String,
    path: PathBuf,
    name: String,
    child: Mutex<Option<Child>>,
    paused: AtomicBool,
}

impl ExternalTrack {
    pub(crate) fn new(command: String, path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            command,
            path: path.to_path_buf(),
            name,
            child: Mutex::new(None),
            paused: AtomicBool::new(false),
        }
    }

    pub fn play(&self, fade_in: Option<Duration>) -> Result<(), Box<dyn Error>> {
        if fade_in.is_some() {
            debug!("external player command ignores fades");
        }
        let mut parts = self.command.split_whitespace();
        let program = parts.next().ok_or("MUSIC_CMD is empty")?;
        let child = Command::new(program).args(parts).arg(&self.path).spawn()?;
        debug!("spawned external player pid {}", child.id());
        let mut guard = self
            .child
            .lock()
            .map_err(|_| "external player state poisoned")?;
        if let Some(mut previous) = guard.replace(child) {
            let _ = previous.kill();
            let _ = previous.wait();
        }
        Ok(())
    }

    #[cfg(unix)]
    fn signal(&self, signal: i32) {
        let Ok(guard) = self.child.lock() else {
            return;
        };
        if let Some(child) = guard.as_ref() {
            // The child is spawned by us and reaped under the same lock
            unsafe {
                libc::kill(child.id() as libc::pid_t, signal);
            }
        }
    }

    pub fn pause(&self) {
        #[cfg(unix)]
        {
            self.signal(libc::SIGSTOP);
            self.paused.store(true, Ordering::Relaxed);
        }
        #[cfg(not(unix))]
        warn!("external player commands cannot be paused on this platform");
    }

    pub fn resume(&self) {
        #[cfg(unix)]
        {
            self.signal(libc::SIGCONT);
            self.paused.store(false, Ordering::Relaxed);
        }
        #[cfg(not(unix))]
        warn!("external player commands cannot be resumed on this platform");
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn halt(&self) {
        let Ok(mut guard) = self.child.lock() else {
            return;
        };
        if let Some(mut child) = guard.take() {
            if let Err(e) = child.kill() {
                debug!("external player already exited: {e}");
            }
            let _ = child.wait();
        }
    }

    pub fn is_playing(&self) -> bool {
        let Ok(mut guard) = self.child.lock() else {
            return false;
        };
        match guard.as_mut().map(|child| child.try_wait()) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                debug!("external player exited: {status}");
                *guard = None;
                false
            }
            Some(Err(e)) => {
                warn!("external player status unavailable: {e}");
                false
            }
            None => false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ExternalTrack {
    fn drop(&mut self) {
        self.halt();
    }
}

/// One loadable/playable music resource.
pub enum Track {
    Stream(StreamTrack),
    External(ExternalTrack),
}

impl Track {
    pub fn play(&self, fade_in: Option<Duration>) -> Result<(), Box<dyn Error>> {
        match self {
            Track::Stream(track) => {
                track.play(fade_in);
                Ok(())
            }
            Track::External(track) => track.play(fade_in),
        }
    }

    pub fn pause(&self) {
        match self {
            Track::Stream(track) => track.pause(),
            Track::External(track) => track.pause(),
        }
    }

    pub fn resume(&self) {
        match self {
            Track::Stream(track) => track.resume(),
            Track::External(track) => track.resume(),
        }
    }

    pub fn is_paused(&self) -> bool {
        match self {
            Track::Stream(track) => track.is_paused(),
            Track::External(track) => track.is_paused(),
        }
    }

    pub fn halt(&self) {
        match self {
            Track::Stream(track) => track.halt(),
            Track::External(track) => track.halt(),
        }
    }

    pub fn fade_out(&self, duration: Duration) {
        match self {
            Track::Stream(track) => track.fade_out(duration),
            Track::External(track) => {
                debug!("external player command ignores fades");
                track.halt();
            }
        }
    }

    pub fn is_playing(&self) -> bool {
        match self {
            Track::Stream(track) => track.is_playing(),
            Track::External(track) => track.is_playing(),
        }
    }

    pub fn set_volume(&self, volume: u32) {
        match self {
            Track::Stream(track) => track.set_volume(volume),
            Track::External(_) => debug!("external player command ignores volume"),
        }
    }

    pub fn volume(&self) -> u32 {
        match self {
            Track::Stream(track) => track.volume(),
            Track::External(_) => MAX_VOLUME,
        }
    }

    pub fn position(&self) -> Duration {
        match self {
            Track::Stream(track) => track.position(),
            Track::External(_) => Duration::ZERO,
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        match self {
            Track::Stream(track) => track.duration(),
            Track::External(_) => None,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Track::Stream(track) => track.name(),
            Track::External(track) => track.name(),
        }
    }

    pub fn music_type(&self) -> MusicType {
        match self {
            Track::Stream(track) => track.music_type(),
            Track::External(_) => MusicType::Cmd,
        }
    }

    pub fn metadata(&self) -> Option<&TrackMetadata> {
        match self {
            Track::Stream(track) => Some(track.metadata()),
            Track::External(_) => None,
        }
    }
}
