//! Spin-orbital fermionic Fock space in the occupation-number basis.

use std::sync::OnceLock;

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{check_enumerable, combinations, fill_random_subset, HilbertSpace};
use crate::error::{NqsError, Result};

/// Fock space of `n_orbitals` spatial orbitals times `2s + 1` spin sectors.
///
/// Mode `i + σ·n_orbitals` is orbital `i` in spin sector `σ`. Occupations are
/// stored as `0.0`/`1.0`. At most 63 modes are supported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpinOrbitalFermions {
    pub n_orbitals: usize,
    /// Spin quantum number; `None` means spinless.
    pub spin: Option<f64>,
    n_fermions: Option<usize>,
    n_fermions_per_spin: Option<Vec<usize>>,
    #[serde(skip)]
    masks: OnceLock<Vec<u64>>,
}

impl SpinOrbitalFermions {
    /// Spinless fermions with an optional fixed total particle number.
    pub fn new(n_orbitals: usize, n_fermions: Option<usize>) -> Result<Self> {
        Self::build(n_orbitals, None, n_fermions, None)
    }

    /// Spinful fermions with a fixed particle number in every spin sector.
    pub fn with_spin(n_orbitals: usize, spin: f64, n_fermions_per_spin: Vec<usize>) -> Result<Self> {
        Self::build(n_orbitals, Some(spin), None, Some(n_fermions_per_spin))
    }

    fn build(
        n_orbitals: usize,
        spin: Option<f64>,
        n_fermions: Option<usize>,
        n_fermions_per_spin: Option<Vec<usize>>,
    ) -> Result<Self> {
        if let Some(s) = spin {
            let two_s = 2.0 * s;
            if s < 0.0 || (two_s - two_s.round()).abs() > 1e-12 {
                return Err(NqsError::InvalidConfiguration(format!(
                    "spin must be a non-negative multiple of 1/2, got {s}"
                )));
            }
        }
        let hi = Self {
            n_orbitals,
            spin,
            n_fermions,
            n_fermions_per_spin,
            masks: OnceLock::new(),
        };
        check_enumerable(hi.n_modes())?;
        if let Some(per_spin) = &hi.n_fermions_per_spin {
            if per_spin.len() != hi.n_spin_subsectors() {
                return Err(NqsError::InvalidConfiguration(format!(
                    "expected {} per-spin fermion counts, got {}",
                    hi.n_spin_subsectors(),
                    per_spin.len()
                )));
            }
            if per_spin.iter().any(|&n| n > n_orbitals) {
                return Err(NqsError::InvalidConfiguration(
                    "more fermions than orbitals in a spin sector".to_string(),
                ));
            }
        }
        if let Some(n) = hi.n_fermions {
            if n > hi.n_modes() {
                return Err(NqsError::InvalidConfiguration(
                    "more fermions than modes".to_string(),
                ));
            }
        }
        Ok(hi)
    }

    pub fn n_spin_subsectors(&self) -> usize {
        self.spin.map_or(1, |s| (2.0 * s + 1.0).round() as usize)
    }

    pub fn n_modes(&self) -> usize {
        self.n_orbitals * self.n_spin_subsectors()
    }

    /// Mode index of orbital `i` in spin sector `sector`.
    pub fn mode(&self, orbital: usize, sector: usize) -> usize {
        orbital + sector * self.n_orbitals
    }

    /// Spin sector of a mode.
    pub fn sector_of(&self, mode: usize) -> usize {
        mode / self.n_orbitals
    }

    /// Sorted bitmasks of all allowed occupations.
    pub fn masks(&self) -> &[u64] {
        self.masks.get_or_init(|| {
            let mut masks = if let Some(per_spin) = &self.n_fermions_per_spin {
                let mut acc = vec![0u64];
                for (sector, &n) in per_spin.iter().enumerate() {
                    let shift = sector * self.n_orbitals;
                    let block = combinations(self.n_orbitals, n);
                    acc = acc
                        .iter()
                        .flat_map(|&a| block.iter().map(move |&b| a | (b << shift)))
                        .collect();
                }
                acc
            } else if let Some(n) = self.n_fermions {
                combinations(self.n_modes(), n)
            } else {
                (0..(1u64 << self.n_modes())).collect()
            };
            masks.sort_unstable();
            masks
        })
    }

    pub fn mask_of(x: &[f64]) -> u64 {
        x.iter()
            .enumerate()
            .filter(|(_, &v)| v > 0.5)
            .fold(0u64, |m, (i, _)| m | (1u64 << i))
    }

    pub fn config_of(&self, mask: u64) -> Vec<f64> {
        (0..self.n_modes())
            .map(|i| (mask >> i & 1) as f64)
            .collect()
    }

    pub fn mask_index(&self, mask: u64) -> Option<usize> {
        self.masks().binary_search(&mask).ok()
    }
}

// The mask cache is derived from the other fields.
impl PartialEq for SpinOrbitalFermions {
    fn eq(&self, other: &Self) -> bool {
        self.n_orbitals == other.n_orbitals
            && self.spin == other.spin
            && self.n_fermions == other.n_fermions
            && self.n_fermions_per_spin == other.n_fermions_per_spin
    }
}

impl HilbertSpace for SpinOrbitalFermions {
    fn size(&self) -> usize {
        self.n_modes()
    }

    fn n_states(&self) -> Result<usize> {
        Ok(self.masks().len())
    }

    fn all_states(&self) -> Result<Vec<Vec<f64>>> {
        Ok(self.masks().iter().map(|&m| self.config_of(m)).collect())
    }

    fn state_index(&self, x: &[f64]) -> Option<usize> {
        if x.len() != self.n_modes() {
            return None;
        }
        self.mask_index(Self::mask_of(x))
    }

    fn random_state<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64> {
        if let Some(per_spin) = &self.n_fermions_per_spin {
            let mut x = vec![0.0; self.n_modes()];
            for (block, &n) in x.chunks_mut(self.n_orbitals.max(1)).zip(per_spin) {
                fill_random_subset(block, n, rng);
            }
            x
        } else if let Some(n) = self.n_fermions {
            let mut x = vec![0.0; self.n_modes()];
            fill_random_subset(&mut x, n, rng);
            x
        } else {
            (0..self.n_modes())
                .map(|_| if rng.gen::<bool>() { 1.0 } else { 0.0 })
                .collect()
        }
    }

    fn flip_site(&self, x: &mut [f64], i: usize) {
        x[i] = 1.0 - x[i];
    }

    fn is_constrained(&self) -> bool {
        self.n_fermions.is_some() || self.n_fermions_per_spin.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spinless_fixed_number() {
        let hi = SpinOrbitalFermions::new(6, Some(3)).unwrap();
        assert_eq!(hi.n_states().unwrap(), 20);
        assert_eq!(hi.n_modes(), 6);
    }

    #[test]
    fn test_spinful_sector_counts() {
        let hi = SpinOrbitalFermions::with_spin(5, 1.0, vec![2, 2, 2]).unwrap();
        assert_eq!(hi.n_spin_subsectors(), 3);
        assert_eq!(hi.n_modes(), 15);
        assert_eq!(hi.n_states().unwrap(), 1000);
        for &m in hi.masks().iter().take(50) {
            for sector in 0..3 {
                let block = (m >> (5 * sector)) & 0b11111;
                assert_eq!(block.count_ones(), 2);
            }
        }
    }

    #[test]
    fn test_invalid_spin_rejected() {
        assert!(SpinOrbitalFermions::with_spin(3, 0.3, vec![1, 1]).is_err());
        assert!(SpinOrbitalFermions::with_spin(3, 0.5, vec![1]).is_err());
    }

    #[test]
    fn test_mode_limit() {
        let hi = SpinOrbitalFermions::new(63, Some(1)).unwrap();
        assert_eq!(hi.n_states().unwrap(), 63);
        assert!(SpinOrbitalFermions::new(64, Some(1)).is_err());
        assert!(SpinOrbitalFermions::with_spin(32, 0.5, vec![1, 1]).is_err());
    }

    #[test]
    fn test_equality_ignores_mask_cache() {
        let a = SpinOrbitalFermions::with_spin(3, 0.5, vec![1, 2]).unwrap();
        let b = a.clone();
        assert_eq!(a.n_states().unwrap(), 9);
        assert_eq!(a, b);
        assert_ne!(a, SpinOrbitalFermions::with_spin(3, 0.5, vec![2, 1]).unwrap());
    }
}
