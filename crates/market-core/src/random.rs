//! Injectable randomness.
//!
//! All shuffles, probability checks and die rolls in the game go through a
//! [`RandomSource`] so a session can be replayed from a seed or scripted in tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::VecDeque;

/// Source of uniform random values.
pub trait RandomSource {
    /// Uniform value in `[0, 1)`.
    fn next_float(&mut self) -> f64;
    /// Uniform integer in `[min, max]` (inclusive). Returns `min` when `max <= min`.
    fn next_int(&mut self, min: i64, max: i64) -> i64;
}

/// Seeded ChaCha8 generator; the default source for live sessions.
#[derive(Clone, Debug)]
pub struct SeededRandom {
    rng: ChaCha8Rng,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Seeds from OS entropy, for sessions with no configured seed.
    pub fn from_entropy() -> Self {
        Self {
            rng: ChaCha8Rng::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn next_float(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn next_int(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        self.rng.gen_range(min..=max)
    }
}

/// Replays queued values, falling back to a seeded generator once a queue runs dry.
///
/// Integers outside the requested range are clamped into it, so a script written
/// for a d6 can also drive shuffles without panicking.
#[derive(Clone, Debug)]
pub struct ScriptedRandom {
    floats: VecDeque<f64>,
    ints: VecDeque<i64>,
    fallback: SeededRandom,
}

impl ScriptedRandom {
    pub fn new() -> Self {
        Self {
            floats: VecDeque::new(),
            ints: VecDeque::new(),
            fallback: SeededRandom::new(0),
        }
    }

    pub fn with_floats<I: IntoIterator<Item = f64>>(mut self, values: I) -> Self {
        self.floats.extend(values);
        self
    }

    pub fn with_ints<I: IntoIterator<Item = i64>>(mut self, values: I) -> Self {
        self.ints.extend(values);
        self
    }

    pub fn push_float(&mut self, value: f64) {
        self.floats.push_back(value);
    }

    pub fn push_int(&mut self, value: i64) {
        self.ints.push_back(value);
    }

    /// Values still queued as (floats, ints).
    pub fn remaining(&self) -> (usize, usize) {
        (self.floats.len(), self.ints.len())
    }
}

impl Default for ScriptedRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for ScriptedRandom {
    fn next_float(&mut self) -> f64 {
        match self.floats.pop_front() {
            Some(v) => v,
            None => self.fallback.next_float(),
        }
    }

    fn next_int(&mut self, min: i64, max: i64) -> i64 {
        match self.ints.pop_front() {
            Some(v) if max > min => v.clamp(min, max),
            Some(_) => min,
            None => self.fallback.next_int(min, max),
        }
    }
}
