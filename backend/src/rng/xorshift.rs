//! xorshift64* random number generator
//!
//! Fast, deterministic PRNG (64-bit state, passes BigCrush). Every random
//! decision in a run (agent order, maintenance agent, action draw, committed
//! fraction, price walk) is drawn from one `RngManager`, so a seed reproduces
//! a run's decisions exactly, given the same ledger responses.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*
///
/// # Example
/// ```
/// use options_sim_core::RngManager;
///
/// let mut rng = RngManager::new(12345);
/// let value = rng.next();
/// let index = rng.index(10); // [0, 10)
/// assert!(index < 10);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a new RNG with given seed (zero is mapped to one)
    pub fn new(seed: u64) -> Self {
        let state = if seed == 0 { 1 } else { seed };
        Self { state }
    }

    /// Generate next random u64 value
    pub fn next(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Uniform index in `[0, len)`
    ///
    /// # Panics
    /// Panics if `len == 0`
    pub fn index(&mut self, len: usize) -> usize {
        assert!(len > 0, "len must be positive");
        (self.next() % len as u64) as usize
    }

    /// Current state (for logging a resumable seed)
    pub fn get_state(&self) -> u64 {
        self.state
    }

    /// Random f64 in `[0.0, 1.0)`
    pub fn next_f64(&mut self) -> f64 {
        let value = self.next();
        (value >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Standard normal sample (Box-Muller)
    pub fn next_gaussian(&mut self) -> f64 {
        // 1 - u keeps the log argument in (0, 1]
        let u1 = 1.0 - self.next_f64();
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// One weighted draw: returns the index of the chosen weight.
    ///
    /// Zero, negative and non-finite weights can never be drawn. Returns
    /// `None` when nothing is drawable.
    ///
    /// # Example
    /// ```
    /// use options_sim_core::RngManager;
    ///
    /// let mut rng = RngManager::new(7);
    /// assert_eq!(rng.choose_weighted(&[0.0, 3.0, 0.0]), Some(1));
    /// assert_eq!(rng.choose_weighted(&[0.0, 0.0]), None);
    /// ```
    pub fn choose_weighted(&mut self, weights: &[f64]) -> Option<usize> {
        let usable = |w: f64| w.is_finite() && w > 0.0;
        let total: f64 = weights.iter().copied().filter(|w| usable(*w)).sum();
        if total <= 0.0 {
            return None;
        }

        let mut target = self.next_f64() * total;
        let mut last_usable = None;
        for (i, w) in weights.iter().copied().enumerate() {
            if !usable(w) {
                continue;
            }
            if target < w {
                return Some(i);
            }
            target -= w;
            last_usable = Some(i);
        }
        // float residue at the top end lands on the last drawable entry
        last_usable
    }

    /// Fisher-Yates shuffle in place
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.index(i + 1);
            items.swap(i, j);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_seed_converted_to_nonzero() {
        let rng = RngManager::new(0);
        assert_ne!(rng.get_state(), 0, "Zero seed should be converted to 1");
    }

    #[test]
    #[should_panic(expected = "len must be positive")]
    fn test_index_empty_panics() {
        let mut rng = RngManager::new(12345);
        rng.index(0);
    }

    #[test]
    fn test_next_f64_in_range() {
        let mut rng = RngManager::new(12345);
        for _ in 0..1000 {
            let val = rng.next_f64();
            assert!((0.0..1.0).contains(&val), "next_f64() produced {}", val);
        }
    }

    #[test]
    fn test_gaussian_is_finite() {
        let mut rng = RngManager::new(99);
        for _ in 0..1000 {
            assert!(rng.next_gaussian().is_finite());
        }
    }

    #[test]
    fn test_choose_weighted_skips_bad_weights() {
        let mut rng = RngManager::new(3);
        for _ in 0..200 {
            let pick = rng
                .choose_weighted(&[0.0, f64::NAN, 2.0, -1.0, 1.0])
                .unwrap();
            assert!(pick == 2 || pick == 4);
        }
    }

    #[test]
    fn test_shuffle_is_permutation() {
        let mut rng = RngManager::new(11);
        let mut items: Vec<u32> = (0..20).collect();
        rng.shuffle(&mut items);
        let mut sorted = items.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, (0..20).collect::<Vec<_>>());
    }
}
