//! Generation registry
//!
//! Tracks which generations are pinned by open snapshots. The collection
//! floor is the smallest pinned generation, or the live generation when
//! nothing is pinned. Pinning and floor computation happen under the same
//! lock, so a reader can never pin a generation below a floor that a
//! collector has already acted on.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::Generation;

#[derive(Debug, Default)]
pub struct GenerationRegistry {
    pins: Mutex<BTreeMap<Generation, usize>>,
}

impl GenerationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn pins(&self) -> MutexGuard<'_, BTreeMap<Generation, usize>> {
        self.pins.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pins the generation returned by `current` while holding the registry
    /// lock.
    pub fn pin_with(self: &Arc<Self>, current: impl FnOnce() -> Generation) -> GenerationPin {
        let mut pins = self.pins();
        let generation = current();
        *pins.entry(generation).or_insert(0) += 1;
        GenerationPin {
            registry: Arc::clone(self),
            generation,
        }
    }

    fn unpin(&self, generation: Generation) {
        let mut pins = self.pins();
        if let Some(count) = pins.get_mut(&generation) {
            *count -= 1;
            if *count == 0 {
                pins.remove(&generation);
            }
        }
    }

    /// Returns the collection floor.
    pub fn floor(&self, live: impl FnOnce() -> Generation) -> Generation {
        let pins = self.pins();
        pins.keys().next().copied().unwrap_or_else(live)
    }

    /// Number of distinct pinned generations.
    pub fn pinned_generations(&self) -> usize {
        self.pins().len()
    }

    /// Total number of open pins.
    pub fn pin_count(&self) -> usize {
        self.pins().values().sum()
    }
}

/// RAII pin on one generation; unpinned on drop.
#[derive(Debug)]
pub struct GenerationPin {
    registry: Arc<GenerationRegistry>,
    generation: Generation,
}

impl GenerationPin {
    #[inline]
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

impl Drop for GenerationPin {
    fn drop(&mut self) {
        self.registry.unpin(self.generation);
    }
}
