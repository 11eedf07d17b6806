//! Die rolling for the spillover mechanic.
//!
//! The engine only ever asks for a single die roll. [`Randomizer`] is that
//! primitive; live play uses [`ThreadRandomizer`], reproducible sessions use
//! [`SeededRandomizer`].

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Synchronous die-roll primitive.
pub trait Randomizer: Send + Sync {
    /// Roll one die, returning a value in `1..=sides`. A zero-sided die rolls 1.
    fn roll_die(&self, sides: u32) -> u32;
}

/// Uses the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandomizer;

impl Randomizer for ThreadRandomizer {
    fn roll_die(&self, sides: u32) -> u32 {
        rand::thread_rng().gen_range(1..=sides.max(1))
    }
}

/// Deterministic rolls from a fixed seed.
#[derive(Debug)]
pub struct SeededRandomizer {
    rng: Mutex<StdRng>,
}

impl SeededRandomizer {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Randomizer for SeededRandomizer {
    fn roll_die(&self, sides: u32) -> u32 {
        // The RNG has no invariant a panic could break.
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_range(1..=sides.max(1))
    }
}
