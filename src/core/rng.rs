//! Deterministic Random Number Generator
//!
//! Uses Xorshift128+ algorithm for fast, high-quality, deterministic
//! randomness. Given the same seed, produces an identical sequence on all
//! platforms. The simulation draws exclusively from one `GameRng` seeded at
//! process start, so a round is a pure function of (seed, action history).

use serde::{Deserialize, Serialize};

/// Deterministic PRNG using Xorshift128+ algorithm.
///
/// # Determinism Guarantee
///
/// Given the same seed, this RNG will produce the exact same sequence
/// of random numbers on any platform (x86, ARM, WASM).
///
/// # Example
///
/// ```
/// use petri::GameRng;
///
/// let mut rng = GameRng::new(12345);
/// let value = rng.next_u64();
/// assert_eq!(value, 6233086606872742541); // Always the same!
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRng {
    state: [u64; 2],
}

impl Default for GameRng {
    fn default() -> Self {
        Self::new(0)
    }
}

impl GameRng {
    /// Create a new RNG from a 64-bit seed.
    ///
    /// Uses SplitMix64 to initialize the internal state, ensuring
    /// good distribution even from weak seeds.
    pub fn new(seed: u64) -> Self {
        let mut s = seed;
        let state0 = splitmix64(&mut s);
        let state1 = splitmix64(&mut s);

        // State must never be all zeros
        let state = if state0 == 0 && state1 == 0 {
            [1, 1]
        } else {
            [state0, state1]
        };

        Self { state }
    }

    /// Generate the next 64-bit random value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.state[0];
        let mut s1 = self.state[1];
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.state[0] = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.state[1] = s1.rotate_left(37);

        result
    }

    /// Generate a random u32.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        self.next_u64() as u32
    }

    /// Generate a random integer in range [0, max).
    #[inline]
    pub fn next_int(&mut self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        // Simple modulo - slight bias for very large max, but acceptable
        (self.next_u64() % max as u64) as u32
    }

    /// Draw a percentage roll in [0, 100).
    ///
    /// One roll decides each cell's fate per generation; survival and
    /// color capture share a single roll.
    #[inline]
    pub fn percent(&mut self) -> u8 {
        self.next_int(100) as u8
    }

    /// Generate a uniform float in [0, 1).
    ///
    /// Uses the top 53 bits so the result is exactly representable.
    #[inline]
    pub fn next_float(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Get current state (for checkpointing/debugging).
    pub fn state(&self) -> [u64; 2] {
        self.state
    }

    /// Restore from saved state.
    pub fn set_state(&mut self, state: [u64; 2]) {
        self.state = state;
    }
}

/// SplitMix64 for seed initialization.
/// Produces well-distributed values from sequential seeds.
#[inline]
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determinism() {
        let mut rng1 = GameRng::new(42);
        let mut rng2 = GameRng::new(42);

        for _ in 0..1000 {
            assert_eq!(rng1.next_u64(), rng2.next_u64());
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let mut rng1 = GameRng::new(1);
        let mut rng2 = GameRng::new(2);

        let a: Vec<u64> = (0..10).map(|_| rng1.next_u64()).collect();
        let b: Vec<u64> = (0..10).map(|_| rng2.next_u64()).collect();
        assert_ne!(a, b);
    }

    #[test]
    fn test_percent_in_range() {
        let mut rng = GameRng::new(7);
        for _ in 0..10_000 {
            assert!(rng.percent() < 100);
        }
    }

    #[test]
    fn test_next_int_bounds() {
        let mut rng = GameRng::new(99);
        for _ in 0..10_000 {
            assert!(rng.next_int(13) < 13);
        }
        assert_eq!(rng.next_int(0), 0);
        assert_eq!(rng.next_int(1), 0);
    }

    #[test]
    fn test_float_in_unit_interval() {
        let mut rng = GameRng::new(123);
        for _ in 0..10_000 {
            let f = rng.next_float();
            assert!((0.0..1.0).contains(&f));
        }
    }

    #[test]
    fn test_zero_seed_not_degenerate() {
        let mut rng = GameRng::new(0);
        let first = rng.next_u64();
        let second = rng.next_u64();
        assert_ne!(first, 0);
        assert_ne!(first, second);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut rng = GameRng::new(555);
        rng.next_u64();
        let saved = rng.state();
        let expected = rng.next_u64();

        let mut restored = GameRng::default();
        restored.set_state(saved);
        assert_eq!(restored.next_u64(), expected);
    }
}
