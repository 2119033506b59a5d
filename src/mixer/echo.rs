//! SPC-style echo effect and its on/off toggler.
//!
//! The effect models the classic SNES DSP echo unit: a per-channel delay
//! ring with an 8-tap FIR filter on the feedback path. Register values keep
//! the DSP conventions: volumes and coefficients are signed fractions over
//! 128, the delay register counts 16 ms units.

use crate::mixer::OutputSpec;
use crate::mixer::fx::{FxChain, PostEffect};
use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy)]
pub struct EchoParams {
    /// EDL: delay length, 0..=15 in 16 ms units
    pub delay: u8,
    /// EFB: feedback amount
    pub feedback: i8,
    /// MVOLL/MVOLR: dry signal volume
    pub main_volume: [i8; 2],
    /// EVOLL/EVOLR: echo signal volume
    pub echo_volume: [i8; 2],
    /// FIR filter coefficients, newest tap first
    pub fir: [i8; 8],
}

impl Default for EchoParams {
    /// The player's reverb-like preset.
    fn default() -> Self {
        Self {
            delay: 4,
            feedback: 108,
            main_volume: [127, 127],
            echo_volume: [21, 21],
            fir: [-1, 8, 23, 36, 36, 23, 8, -1],
        }
    }
}

fn ring_frames(delay: u8, rate: u32) -> usize {
    let ms = u64::from(delay.min(15)) * 16;
    ((u64::from(rate) * ms / 1000) as usize).max(1)
}

struct EchoState {
    /// One delay ring per channel, all the same length
    rings: Vec<Vec<f32>>,
    write_pos: usize,
    /// FIR history per channel, indexed by `hist_pos`
    fir_hist: Vec<[f32; 8]>,
    hist_pos: usize,
}

pub struct EchoEffect {
    params: EchoParams,
    state: Mutex<EchoState>,
    released: AtomicBool,
}

impl EchoEffect {
    pub fn new(params: EchoParams, spec: OutputSpec) -> Self {
        let channels = spec.channels.max(1) as usize;
        let frames = ring_frames(params.delay, spec.rate);
        Self {
            params,
            state: Mutex::new(EchoState {
                rings: vec![vec![0.0; frames]; channels],
                write_pos: 0,
                fir_hist: vec![[0.0; 8]; channels],
                hist_pos: 0,
            }),
            released: AtomicBool::new(false),
        }
    }

    pub fn params(&self) -> &EchoParams {
        &self.params
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    /// Returns true when this call performed the release; the loser of the
    /// race sees false and must not repeat the side effect.
    fn mark_released(&self) -> bool {
        !self.released.swap(true, Ordering::AcqRel)
    }
}

impl PostEffect for EchoEffect {
    fn name(&self) -> &'static str {
        "spc echo"
    }

    fn process(&self, block: &mut [f32], spec: &OutputSpec) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        let EchoState {
            rings,
            write_pos,
            fir_hist,
            hist_pos,
        } = &mut *state;

        let channels = (spec.channels.max(1) as usize).min(rings.len());
        let ring_len = rings[0].len();
        let feedback = f32::from(self.params.feedback) / 128.0;
        let mut fir = [0.0f32; 8];
        for (slot, tap) in fir.iter_mut().zip(self.params.fir.iter()) {
            *slot = f32::from(*tap) / 128.0;
        }
        let mvol = [
            f32::from(self.params.main_volume[0]) / 128.0,
            f32::from(self.params.main_volume[1]) / 128.0,
        ];
        let evol = [
            f32::from(self.params.echo_volume[0]) / 128.0,
            f32::from(self.params.echo_volume[1]) / 128.0,
        ];

        for frame in block.chunks_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let ring = &mut rings[ch];
                let hist = &mut fir_hist[ch];

                // Oldest ring sample is the one the write position is about
                // to overwrite
                let tapped = ring[*write_pos];
                hist[*hist_pos] = tapped;
                let mut echo = 0.0f32;
                for (i, coeff) in fir.iter().enumerate() {
                    let idx = (*hist_pos + 8 - i) % 8;
                    echo += hist[idx] * coeff;
                }

                let dry = *sample;
                let side = ch.min(1);
                *sample = dry * mvol[side] + echo * evol[side];
                // Feedback write saturates the way the hardware does
                ring[*write_pos] = (dry + echo * feedback).clamp(-1.0, 1.0);
            }
            *write_pos = (*write_pos + 1) % ring_len;
            *hist_pos = (*hist_pos + 1) % 8;
        }
    }

    fn done(&self) {
        if self.mark_released() {
            debug!("echo effect released by the mix chain");
        }
    }
}

/// Lazily creates and tears down the one live echo instance.
///
/// `enable` is idempotent and `disable` without a live instance is a no-op.
/// The chain's asynchronous teardown callback and a foreground `disable` can
/// race freely: the atomic release flag decides a single winner, and the
/// `Arc` keeps the loser's reference valid until it lets go.
pub struct EchoToggle {
    instance: Option<Arc<EchoEffect>>,
}

impl EchoToggle {
    pub fn new() -> Self {
        Self { instance: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.instance.as_ref().is_some_and(|fx| !fx.is_released())
    }

    pub fn enable(&mut self, chain: &FxChain, spec: OutputSpec) {
        if let Some(fx) = &self.instance
            && !fx.is_released()
        {
            // Already live; leave the instance untouched
            return;
        }
        let fx = Arc::new(EchoEffect::new(EchoParams::default(), spec));
        chain.register(fx.clone());
        self.instance = Some(fx);
        info!("Echo effect ON");
    }

    pub fn disable(&mut self, chain: &FxChain) {
        let Some(fx) = self.instance.take() else {
            return;
        };
        if fx.mark_released() {
            let handle: Arc<dyn PostEffect> = fx;
            chain.unregister(&handle);
            info!("Echo effect OFF");
        }
        // Otherwise the chain tore the effect down first and already owns
        // the release; dropping our reference is all that is left to do.
    }

    pub fn toggle(&mut self, chain: &FxChain, spec: OutputSpec) -> bool {
        if self.is_enabled() {
            self.disable(chain);
            false
        } else {
            self.enable(chain, spec);
            true
        }
    }
}

impl Default for EchoToggle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::SampleFormat;

    fn spec(rate: u32, channels: u16) -> OutputSpec {
        OutputSpec {
            rate,
            channels,
            format: SampleFormat::S16,
            buffers: 4096,
        }
    }

    #[test]
    fn test_ring_frames() {
        assert_eq!(ring_frames(4, 44100), 2822); // 64 ms
        assert_eq!(ring_frames(0, 44100), 1);
        assert_eq!(ring_frames(15, 48000), 11520); // 240 ms
        // Delay register is 4 bits; larger values saturate
        assert_eq!(ring_frames(200, 48000), ring_frames(15, 48000));
    }

    #[test]
    fn test_impulse_produces_delayed_echo() {
        let params = EchoParams {
            delay: 1, // 16 ms at 1 kHz = 16 frames
            ..EchoParams::default()
        };
        let effect = EchoEffect::new(params, spec(1000, 1));

        let mut block = vec![0.0f32; 64];
        block[0] = 1.0;
        effect.process(&mut block, &spec(1000, 1));

        // Dry path: impulse scaled by main volume
        assert!((block[0] - 127.0 / 128.0).abs() < 1e-6);
        // Nothing comes back before the delay line wraps
        for sample in &block[1..16] {
            assert_eq!(*sample, 0.0);
        }
        // The echo surfaces one delay length later
        assert!(block[16].abs() > 1e-4);
    }

    #[test]
    fn test_silence_stays_silent() {
        let effect = EchoEffect::new(EchoParams::default(), spec(44100, 2));
        let mut block = vec![0.0f32; 256];
        effect.process(&mut block, &spec(44100, 2));
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_enable_twice_keeps_one_instance() {
        let chain = FxChain::new();
        let mut toggle = EchoToggle::new();

        toggle.enable(&chain, spec(44100, 2));
        let first = toggle.instance.clone().unwrap();
        toggle.enable(&chain, spec(44100, 2));

        assert_eq!(chain.len(), 1);
        assert!(Arc::ptr_eq(&first, toggle.instance.as_ref().unwrap()));
        assert!(toggle.is_enabled());
    }

    #[test]
    fn test_disable_twice_second_is_noop() {
        let chain = FxChain::new();
        let mut toggle = EchoToggle::new();

        toggle.enable(&chain, spec(44100, 2));
        toggle.disable(&chain);
        assert!(chain.is_empty());
        assert!(!toggle.is_enabled());

        // Nothing to do, nothing to panic over
        toggle.disable(&chain);
        assert!(chain.is_empty());
    }

    #[test]
    fn test_chain_teardown_wins_release_race() {
        let chain = FxChain::new();
        let mut toggle = EchoToggle::new();

        toggle.enable(&chain, spec(44100, 2));
        let fx = toggle.instance.clone().unwrap();

        // The bus drops the chain first
        chain.teardown();
        assert!(fx.is_released());
        assert!(!toggle.is_enabled());

        // Foreground disable loses the race and must not release again
        toggle.disable(&chain);
        assert!(toggle.instance.is_none());
    }

    #[test]
    fn test_enable_after_teardown_builds_fresh_instance() {
        let chain = FxChain::new();
        let mut toggle = EchoToggle::new();

        toggle.enable(&chain, spec(44100, 2));
        let first = toggle.instance.clone().unwrap();
        chain.teardown();

        toggle.enable(&chain, spec(44100, 2));
        assert!(toggle.is_enabled());
        assert_eq!(chain.len(), 1);
        assert!(!Arc::ptr_eq(&first, toggle.instance.as_ref().unwrap()));
    }

    #[test]
    fn test_toggle_roundtrip() {
        let chain = FxChain::new();
        let mut toggle = EchoToggle::new();

        assert!(toggle.toggle(&chain, spec(44100, 2)));
        assert!(toggle.is_enabled());
        assert!(!toggle.toggle(&chain, spec(44100, 2)));
        assert!(!toggle.is_enabled());
        assert!(chain.is_empty());
    }
}
