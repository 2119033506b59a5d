//! Master mix bus combining every live source with post-mix effects.
//!
//! The bus is a single endless `Source` handed to the output sink: it sums
//! whatever tracks and chunks are currently registered, runs the effect chain
//! over each block, and yields silence when nothing is playing so the device
//! stream never ends. Inputs are converted to the bus rate/channel layout as
//! they are added.

use crate::mixer::OutputSpec;
use crate::mixer::fx::FxChain;
use rodio::Source;
use rodio::source::UniformSourceIterator;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Samples mixed per refill; also the effect-chain processing granularity
const BLOCK_LEN: usize = 512;

type BoxedSource = Box<dyn Source<Item = f32> + Send>;

/// Build a connected controller/bus pair for the given output spec.
pub fn mix_bus(spec: OutputSpec, chain: Arc<FxChain>) -> (BusController, MixBus) {
    let pending = Arc::new(Mutex::new(Vec::new()));
    let controller = BusController {
        pending: pending.clone(),
        spec,
    };
    let bus = MixBus {
        pending,
        sources: Vec::new(),
        chain,
        spec,
        block: Vec::new(),
        pos: 0,
    };
    (controller, bus)
}

/// Shared handle for feeding sources into the bus from the driver side.
#[derive(Clone)]
pub struct BusController {
    pending: Arc<Mutex<Vec<BoxedSource>>>,
    spec: OutputSpec,
}

impl BusController {
    pub fn add<S>(&self, source: S)
    where
        S: Source<Item = f32> + Send + 'static,
    {
        // Convert to the device layout up front so mixing is a plain sum
        let uniform = UniformSourceIterator::new(source, self.spec.channels, self.spec.rate);
        if let Ok(mut pending) = self.pending.lock() {
            pending.push(Box::new(uniform));
        }
    }

    pub fn spec(&self) -> OutputSpec {
        self.spec
    }
}

pub struct MixBus {
    pending: Arc<Mutex<Vec<BoxedSource>>>,
    sources: Vec<BoxedSource>,
    chain: Arc<FxChain>,
    spec: OutputSpec,
    block: Vec<f32>,
    pos: usize,
}

impl MixBus {
    fn refill(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            self.sources.append(&mut pending);
        }

        self.block.clear();
        self.block.resize(BLOCK_LEN, 0.0);

        let mut alive = Vec::with_capacity(self.sources.len());
        for mut source in self.sources.drain(..) {
            let mut exhausted = false;
            for slot in self.block.iter_mut() {
                match source.next() {
                    Some(sample) => *slot += sample,
                    None => {
                        exhausted = true;
                        break;
                    }
                }
            }
            if !exhausted {
                alive.push(source);
            }
        }
        self.sources = alive;

        self.chain.process(&mut self.block, &self.spec);

        // Clamp to prevent clipping after summing and effects
        for sample in self.block.iter_mut() {
            *sample = sample.clamp(-1.0, 1.0);
        }

        self.pos = 0;
    }
}

impl Iterator for MixBus {
    type Item = f32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.block.len() {
            self.refill();
        }
        let sample = self.block[self.pos];
        self.pos += 1;
        Some(sample)
    }
}

impl Source for MixBus {
    fn current_frame_len(&self) -> Option<usize> {
        None
    }

    fn channels(&self) -> u16 {
        self.spec.channels
    }

    fn sample_rate(&self) -> u32 {
        self.spec.rate
    }

    fn total_duration(&self) -> Option<Duration> {
        None
    }
}

impl Drop for MixBus {
    fn drop(&mut self) {
        // The stream is going away; give registered effects their release
        // callback from whichever thread drops the source
        self.chain.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::SampleFormat;
    use crate::mixer::fx::PostEffect;
    use rodio::buffer::SamplesBuffer;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn spec() -> OutputSpec {
        OutputSpec {
            rate: 44100,
            channels: 2,
            format: SampleFormat::S16,
            buffers: 4096,
        }
    }

    #[test]
    fn test_empty_bus_yields_silence_forever() {
        let chain = Arc::new(FxChain::new());
        let (_controller, mut bus) = mix_bus(spec(), chain);

        for _ in 0..BLOCK_LEN * 2 {
            assert_eq!(bus.next(), Some(0.0));
        }
    }

    #[test]
    fn test_added_source_is_mixed_then_bus_goes_quiet() {
        let chain = Arc::new(FxChain::new());
        let (controller, mut bus) = mix_bus(spec(), chain);

        // Same layout as the bus, so samples pass through unresampled
        controller.add(SamplesBuffer::new(2, 44100, vec![0.25f32; 100]));

        let first: Vec<f32> = (&mut bus).take(100).collect();
        assert!(first.iter().all(|&s| (s - 0.25).abs() < 1e-6));

        // Exhausted source drops out, bus keeps running on silence
        let rest: Vec<f32> = (&mut bus).take(BLOCK_LEN).collect();
        assert!(rest.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_two_sources_sum_and_clamp() {
        let chain = Arc::new(FxChain::new());
        let (controller, mut bus) = mix_bus(spec(), chain);

        controller.add(SamplesBuffer::new(2, 44100, vec![0.8f32; 64]));
        controller.add(SamplesBuffer::new(2, 44100, vec![0.8f32; 64]));

        let mixed: Vec<f32> = (&mut bus).take(64).collect();
        // 1.6 summed, clamped to 1.0
        assert!(mixed.iter().all(|&s| (s - 1.0).abs() < 1e-6));
    }

    struct TouchEffect {
        blocks: AtomicUsize,
    }

    impl PostEffect for TouchEffect {
        fn name(&self) -> &'static str {
            "touch"
        }

        fn process(&self, block: &mut [f32], _spec: &OutputSpec) {
            self.blocks.fetch_add(1, Ordering::SeqCst);
            for sample in block.iter_mut() {
                *sample += 0.1;
            }
        }

        fn done(&self) {}
    }

    #[test]
    fn test_chain_runs_post_mix() {
        let chain = Arc::new(FxChain::new());
        let effect = Arc::new(TouchEffect {
            blocks: AtomicUsize::new(0),
        });
        chain.register(effect.clone());

        let (_controller, mut bus) = mix_bus(spec(), chain);
        let samples: Vec<f32> = (&mut bus).take(BLOCK_LEN).collect();

        assert_eq!(effect.blocks.load(Ordering::SeqCst), 1);
        assert!(samples.iter().all(|&s| (s - 0.1).abs() < 1e-6));
    }

    #[test]
    fn test_dropping_bus_tears_down_chain() {
        struct ReleaseFlag(AtomicUsize);
        impl PostEffect for ReleaseFlag {
            fn name(&self) -> &'static str {
                "release flag"
            }
            fn process(&self, _block: &mut [f32], _spec: &OutputSpec) {}
            fn done(&self) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let chain = Arc::new(FxChain::new());
        let effect = Arc::new(ReleaseFlag(AtomicUsize::new(0)));
        chain.register(effect.clone());

        {
            let (_controller, _bus) = mix_bus(spec(), chain.clone());
        }
        assert_eq!(effect.0.load(Ordering::SeqCst), 1);
    }
}
