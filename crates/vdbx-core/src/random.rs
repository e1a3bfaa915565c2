//! Seedable random stream behind `RAND()`
//!
//! The stream is reproducible once seeded. Until then it is lazily drawn
//! from OS entropy.

use rand::Rng;
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Generator state owned by one execution context
#[derive(Debug, Default)]
pub struct RandomSource {
    rng: Option<ChaCha20Rng>,
    generation: u64,
}

impl RandomSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next value in `[0, 1)` from the current stream
    pub fn next(&mut self) -> f64 {
        let generation = &mut self.generation;
        let rng = self.rng.get_or_insert_with(|| {
            *generation += 1;
            ChaCha20Rng::from_entropy()
        });
        rng.gen::<f64>()
    }

    /// Replace the stream with one seeded from `seed` and return its first value
    pub fn reseed(&mut self, seed: i64) -> f64 {
        self.rng = Some(ChaCha20Rng::seed_from_u64(seed as u64));
        self.generation += 1;
        self.next()
    }

    /// Increments every time the stream is (re)initialized; 0 before first use
    pub fn generation(&self) -> u64 {
        self.generation
    }
}
