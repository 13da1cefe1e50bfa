//! Random-variable scratch utilities
//!
//! Currently just a Bernoulli sampler.

use rand::Rng;

/// A Bernoulli random variable with success probability `p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bernoulli {
    p: f64,
}

impl Bernoulli {
    /// Creates a Bernoulli distribution; `p` is clamped to [0, 1].
    pub fn new(p: f64) -> Self {
        Self {
            p: p.clamp(0.0, 1.0),
        }
    }

    /// Draws `n` samples, each 0 or 1.
    pub fn sample<R: Rng>(&self, rng: &mut R, n: usize) -> Vec<u8> {
        (0..n).map(|_| u8::from(rng.gen::<f64>() < self.p)).collect()
    }

    /// Mean of the distribution, which is just `p`.
    pub fn mean(&self) -> f64 {
        self.p
    }
}
