//! Post-mix effect chain.
//!
//! Effects registered here run over the combined bus output, block by block,
//! on the audio thread. The chain owns shared handles so an effect can also
//! be held by whoever registered it; teardown notifies every still-registered
//! effect through its release callback.

use crate::mixer::OutputSpec;
use log::debug;
use std::sync::{Arc, Mutex};

/// A DSP stage applied to the combined output before it reaches the device.
pub trait PostEffect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Process one interleaved f32 block in place.
    fn process(&self, block: &mut [f32], spec: &OutputSpec);

    /// Release callback, invoked by the chain when it tears down with the
    /// effect still registered. May run on the audio thread, concurrently
    /// with a foreground unregister; implementations must make the release
    /// side effect fire exactly once.
    fn done(&self);
}

pub struct FxChain {
    effects: Mutex<Vec<Arc<dyn PostEffect>>>,
}

impl FxChain {
    pub fn new() -> Self {
        Self {
            effects: Mutex::new(Vec::new()),
        }
    }

    pub fn register(&self, effect: Arc<dyn PostEffect>) {
        let Ok(mut effects) = self.effects.lock() else {
            return;
        };
        debug!("registered post effect: {}", effect.name());
        effects.push(effect);
    }

    /// Remove a registered effect by identity. Returns false when the effect
    /// was not registered (already torn down, or never added).
    pub fn unregister(&self, effect: &Arc<dyn PostEffect>) -> bool {
        let Ok(mut effects) = self.effects.lock() else {
            return false;
        };
        let before = effects.len();
        effects.retain(|registered| !Arc::ptr_eq(registered, effect));
        if effects.len() < before {
            debug!("unregistered post effect: {}", effect.name());
            true
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        self.effects.lock().map(|effects| effects.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered effect over one interleaved block.
    pub fn process(&self, block: &mut [f32], spec: &OutputSpec) {
        let Ok(effects) = self.effects.lock() else {
            return;
        };
        for effect in effects.iter() {
            effect.process(block, spec);
        }
    }

    /// Drain the chain and fire each effect's release callback. Runs when
    /// the bus source is dropped; calling it again is a no-op.
    pub fn teardown(&self) {
        let drained: Vec<Arc<dyn PostEffect>> = match self.effects.lock() {
            Ok(mut effects) => std::mem::take(&mut *effects),
            Err(_) => return,
        };
        for effect in drained {
            debug!("chain teardown: releasing {}", effect.name());
            effect.done();
        }
    }
}

impl Default for FxChain {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FxChain {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mixer::{OutputSpec, SampleFormat};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEffect {
        processed: AtomicUsize,
        released: AtomicUsize,
    }

    impl CountingEffect {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                processed: AtomicUsize::new(0),
                released: AtomicUsize::new(0),
            })
        }
    }

    impl PostEffect for CountingEffect {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn process(&self, block: &mut [f32], _spec: &OutputSpec) {
            self.processed.fetch_add(1, Ordering::SeqCst);
            for sample in block.iter_mut() {
                *sample *= 0.5;
            }
        }

        fn done(&self) {
            self.released.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn spec() -> OutputSpec {
        OutputSpec {
            rate: 44100,
            channels: 2,
            format: SampleFormat::S16,
            buffers: 4096,
        }
    }

    #[test]
    fn test_register_and_process() {
        let chain = FxChain::new();
        let effect = CountingEffect::new();
        chain.register(effect.clone());
        assert_eq!(chain.len(), 1);

        let mut block = vec![1.0f32; 8];
        chain.process(&mut block, &spec());
        assert_eq!(effect.processed.load(Ordering::SeqCst), 1);
        assert!(block.iter().all(|&s| s == 0.5));
    }

    #[test]
    fn test_unregister_by_identity() {
        let chain = FxChain::new();
        let effect = CountingEffect::new();
        let handle: Arc<dyn PostEffect> = effect.clone();
        chain.register(effect.clone());

        assert!(chain.unregister(&handle));
        assert!(chain.is_empty());
        // Second removal finds nothing
        assert!(!chain.unregister(&handle));
    }

    #[test]
    fn test_teardown_releases_exactly_once() {
        let chain = FxChain::new();
        let effect = CountingEffect::new();
        chain.register(effect.clone());

        chain.teardown();
        assert!(chain.is_empty());
        assert_eq!(effect.released.load(Ordering::SeqCst), 1);

        // Drained chain has nothing left to release
        chain.teardown();
        assert_eq!(effect.released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregister_after_teardown_is_noop() {
        let chain = FxChain::new();
        let effect = CountingEffect::new();
        let handle: Arc<dyn PostEffect> = effect.clone();
        chain.register(effect.clone());

        chain.teardown();
        assert!(!chain.unregister(&handle));
    }

    #[test]
    fn test_drop_fires_release() {
        let effect = CountingEffect::new();
        {
            let chain = FxChain::new();
            chain.register(effect.clone());
        }
        assert_eq!(effect.released.load(Ordering::SeqCst), 1);
    }
}
