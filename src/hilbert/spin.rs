//! Spin-1/2 configuration space with optional total magnetization.

use std::sync::OnceLock;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_enumerable, combinations, fill_random_subset, HilbertSpace};
use crate::error::Result;

/// Spin-1/2 chain or lattice. Each site takes values `-1.0` or `+1.0`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinHilbert {
    /// Number of sites
    pub n_sites: usize,
    /// Fixed number of up spins, if constrained
    n_up: Option<usize>,
    #[serde(skip)]
    masks: OnceLock<Vec<u64>>,
}

impl SpinHilbert {
    pub fn new(n_sites: usize) -> Self {
        Self {
            n_sites,
            n_up: None,
            masks: OnceLock::new(),
        }
    }

    /// Restrict to states with total `S^z = total_sz` (in units where a
    /// single spin is ±1/2).
    pub fn with_total_sz(mut self, total_sz: f64) -> Self {
        let n_up = (self.n_sites as f64 / 2.0 + total_sz).round();
        self.n_up = Some(n_up.clamp(0.0, self.n_sites as f64) as usize);
        self.masks = OnceLock::new();
        self
    }

    pub fn total_sz(&self) -> Option<f64> {
        self.n_up
            .map(|n_up| n_up as f64 - self.n_sites as f64 / 2.0)
    }

    /// Sorted bitmasks of all allowed states; fails past 63 sites.
    fn masks(&self) -> Result<&[u64]> {
        check_enumerable(self.n_sites)?;
        Ok(self.masks.get_or_init(|| match self.n_up {
            Some(k) => combinations(self.n_sites, k),
            None => (0..(1u64 << self.n_sites)).collect(),
        }))
    }

    /// Bit `i` of the mask is set when site `i` points up.
    pub fn mask_of(x: &[f64]) -> u64 {
        x.iter()
            .enumerate()
            .filter(|(_, &v)| v > 0.0)
            .fold(0u64, |m, (i, _)| m | (1u64 << i))
    }

    pub fn config_of(&self, mask: u64) -> Vec<f64> {
        (0..self.n_sites)
            .map(|i| if mask >> i & 1 == 1 { 1.0 } else { -1.0 })
            .collect()
    }
}

impl HilbertSpace for SpinHilbert {
    fn size(&self) -> usize {
        self.n_sites
    }

    fn n_states(&self) -> Result<usize> {
        Ok(self.masks()?.len())
    }

    fn all_states(&self) -> Result<Vec<Vec<f64>>> {
        Ok(self.masks()?.iter().map(|&m| self.config_of(m)).collect())
    }

    fn state_index(&self, x: &[f64]) -> Option<usize> {
        if x.len() != self.n_sites {
            return None;
        }
        self.masks().ok()?.binary_search(&Self::mask_of(x)).ok()
    }

    fn random_state<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        match self.n_up {
            Some(k) => {
                let mut x = vec![-1.0; self.n_sites];
                fill_random_subset(&mut x, k, rng);
                x
            }
            None => (0..self.n_sites)
                .map(|_| if rng.gen::<bool>() { 1.0 } else { -1.0 })
                .collect(),
        }
    }

    fn flip_site(&self, x: &mut [f64], i: usize) {
        x[i] = -x[i];
    }

    fn is_constrained(&self) -> bool {
        self.n_up.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_unconstrained_states() {
        let hi = SpinHilbert::new(4);
        assert_eq!(hi.n_states().unwrap(), 16);
        for (i, s) in hi.all_states().unwrap().iter().enumerate() {
            assert_eq!(hi.state_index(s), Some(i));
        }
    }

    #[test]
    fn test_total_sz_constraint() {
        let hi = SpinHilbert::new(6).with_total_sz(0.0);
        assert_eq!(hi.n_states().unwrap(), 20);
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            let x = hi.random_state(&mut rng);
            assert_eq!(x.iter().sum::<f64>(), 0.0);
            assert!(hi.state_index(&x).is_some());
        }
    }

    #[test]
    fn test_large_lattice_samples_but_does_not_enumerate() {
        let mut rng = StdRng::seed_from_u64(5);
        let hi = SpinHilbert::new(81);
        let x = hi.random_state(&mut rng);
        assert_eq!(x.len(), 81);
        assert!(x.iter().all(|&v| v == 1.0 || v == -1.0));
        assert!(hi.n_states().is_err());
        assert!(hi.all_states().is_err());
        assert_eq!(hi.state_index(&x), None);

        let hi = SpinHilbert::new(100).with_total_sz(0.0);
        let x = hi.random_state(&mut rng);
        assert_eq!(x.iter().filter(|&&v| v > 0.0).count(), 50);
    }
}
