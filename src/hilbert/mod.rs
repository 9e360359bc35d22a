//! Hilbert module - discrete configuration spaces and lattices.

mod fermions;
mod lattice;
mod spin;

pub use fermions::SpinOrbitalFermions;
pub use lattice::SquareLattice;
pub use spin::SpinHilbert;

use rand::Rng;

use crate::error::{NqsError, Result};

/// Largest number of sites or modes whose basis can be enumerated as `u64`
/// bitmasks.
pub const MAX_BITMASK_SITES: usize = 63;

/// A finite, discrete configuration space.
///
/// Configurations are stored as `f64` slices (one entry per site or mode) so
/// that models and operators share a single representation.
pub trait HilbertSpace {
    /// Number of sites (or fermionic modes).
    fn size(&self) -> usize;

    /// Number of basis states satisfying the constraints. Fails when the
    /// space is too large to enumerate.
    fn n_states(&self) -> Result<usize>;

    /// All basis states, in the order used by `to_dense`.
    fn all_states(&self) -> Result<Vec<Vec<f64>>>;

    /// Index of `x` in `all_states`, if it is a valid state of an
    /// enumerable space.
    fn state_index(&self, x: &[f64]) -> Option<usize>;

    /// Draw a uniformly random state satisfying the constraints.
    fn random_state<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<f64>;

    /// Toggle the local state of site `i` in place.
    fn flip_site(&self, x: &mut [f64], i: usize);

    /// Whether single-site flips can leave the space (fixed magnetization
    /// or particle number).
    fn is_constrained(&self) -> bool;
}

pub(crate) fn check_enumerable(n_sites: usize) -> Result<()> {
    if n_sites > MAX_BITMASK_SITES {
        return Err(NqsError::InvalidConfiguration(format!(
            "{n_sites} sites exceed the {MAX_BITMASK_SITES}-site enumeration limit"
        )));
    }
    Ok(())
}

/// All `k`-bit subsets of `n_bits` bits, ascending (Gosper's hack).
/// `n_bits` must not exceed `MAX_BITMASK_SITES`.
pub(crate) fn combinations(n_bits: usize, k: usize) -> Vec<u64> {
    debug_assert!(n_bits <= MAX_BITMASK_SITES);
    if k > n_bits {
        return Vec::new();
    }
    if k == 0 {
        return vec![0];
    }
    let limit = 1u64 << n_bits;
    let mut out = Vec::new();
    let mut x: u64 = (1u64 << k) - 1;
    while x < limit {
        out.push(x);
        let c = x & x.wrapping_neg();
        let r = x + c;
        x = (((r ^ x) >> 2) / c) | r;
    }
    out
}

/// Set `k` distinct positions of `x`, chosen uniformly at random, to `1.0`.
pub(crate) fn fill_random_subset<R: Rng + ?Sized>(x: &mut [f64], k: usize, rng: &mut R) {
    let n = x.len();
    for i in rand::seq::index::sample(rng, n, k.min(n)) {
        x[i] = 1.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combinations_count_and_order() {
        let c = combinations(6, 3);
        assert_eq!(c.len(), 20);
        assert!(c.windows(2).all(|w| w[0] < w[1]));
        assert!(c.iter().all(|m| m.count_ones() == 3));
        assert_eq!(combinations(4, 0), vec![0]);
        assert!(combinations(2, 3).is_empty());
    }

    #[test]
    fn test_combinations_at_enumeration_limit() {
        let top = combinations(MAX_BITMASK_SITES, 1);
        assert_eq!(top.len(), MAX_BITMASK_SITES);
        assert_eq!(top.last(), Some(&(1u64 << 62)));
        assert!(check_enumerable(MAX_BITMASK_SITES).is_ok());
        assert!(check_enumerable(MAX_BITMASK_SITES + 1).is_err());
    }
}
