//! Sparse coefficient tensors and Jordan-Wigner sign helpers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FermionError;

/// Sparse tensor `h[i_1, …, i_r]` over `n` indices.
///
/// A rank `2k` tensor holds the coefficients of
/// `c†_{i_1} … c†_{i_k} c_{i_{k+1}} … c_{i_{2k}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparseCoefficients {
    n: usize,
    rank: usize,
    entries: BTreeMap<Vec<usize>, f64>,
}

impl SparseCoefficients {
    pub fn new(n: usize, rank: usize) -> Self {
        Self { n, rank, entries: BTreeMap::new() }
    }

    /// Build from a dense row-major array of `n^rank` values; zeros are skipped.
    pub fn from_dense(n: usize, rank: usize, values: &[f64]) -> Result<Self, FermionError> {
        let expected = n.checked_pow(rank as u32).unwrap_or(usize::MAX);
        if values.len() != expected {
            return Err(FermionError::ShapeMismatch(format!(
                "dense array of length {} does not match {n}^{rank}",
                values.len()
            )));
        }
        let mut out = Self::new(n, rank);
        for (flat, &v) in values.iter().enumerate() {
            if v != 0.0 {
                let mut idx = vec![0; rank];
                let mut rest = flat;
                for slot in idx.iter_mut().rev() {
                    *slot = rest % n;
                    rest /= n;
                }
                out.entries.insert(idx, v);
            }
        }
        Ok(out)
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    /// Number of creation (and annihilation) operators per entry.
    pub fn order(&self) -> usize {
        self.rank / 2
    }

    pub fn nnz(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, idx: &[usize]) -> f64 {
        self.entries.get(idx).copied().unwrap_or(0.0)
    }

    /// Accumulate `value` at `idx`.
    pub fn add(&mut self, idx: Vec<usize>, value: f64) -> Result<(), FermionError> {
        if idx.len() != self.rank {
            return Err(FermionError::ShapeMismatch(format!(
                "index {idx:?} has {} entries, tensor rank is {}",
                idx.len(),
                self.rank
            )));
        }
        if let Some(&bad) = idx.iter().find(|&&i| i >= self.n) {
            return Err(FermionError::OrbitalOutOfRange { orbital: bad, n_modes: self.n });
        }
        *self.entries.entry(idx).or_insert(0.0) += value;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&[usize], f64)> + '_ {
        self.entries.iter().map(|(k, &v)| (k.as_slice(), v))
    }

    /// Drop entries with `|h| <= cutoff`.
    pub fn truncated(&self, cutoff: f64) -> Self {
        Self {
            n: self.n,
            rank: self.rank,
            entries: self
                .entries
                .iter()
                .filter(|(_, v)| v.abs() > cutoff)
                .map(|(k, &v)| (k.clone(), v))
                .collect(),
        }
    }

    /// Keep only entries whose creation and annihilation halves are both
    /// non-increasing.
    pub fn normal_ordered_part(&self) -> Self {
        let k = self.order();
        Self {
            n: self.n,
            rank: self.rank,
            entries: self
                .entries
                .iter()
                .filter(|(idx, _)| is_non_increasing(&idx[..k]) && is_non_increasing(&idx[k..]))
                .map(|(idx, &v)| (idx.clone(), v))
                .collect(),
        }
    }
}

pub(crate) fn is_non_increasing(idx: &[usize]) -> bool {
    idx.windows(2).all(|w| w[0] >= w[1])
}

#[inline]
pub(crate) fn below(mask: u64, mode: usize) -> u32 {
    (mask & ((1u64 << mode) - 1)).count_ones()
}

#[inline]
fn jw_sign(mask: u64, mode: usize) -> f64 {
    if below(mask, mode) % 2 == 0 {
        1.0
    } else {
        -1.0
    }
}

/// Apply `c_j` for every bit `j` of `modes`, smallest mode first.
///
/// This is the action of `c_{b_1} … c_{b_k}` with `b_1 > … > b_k`.
pub(crate) fn annihilate(mask: u64, modes: u64) -> Option<(u64, f64)> {
    if mask & modes != modes {
        return None;
    }
    let mut x = mask;
    let mut sign = 1.0;
    let mut rest = modes;
    while rest != 0 {
        let j = rest.trailing_zeros() as usize;
        sign *= jw_sign(x, j);
        x &= !(1u64 << j);
        rest &= rest - 1;
    }
    Some((x, sign))
}

/// Apply `c†_{a_1} … c†_{a_k}` with `a_1 > … > a_k` (the bits of `modes`).
pub(crate) fn create(mask: u64, modes: u64) -> Option<(u64, f64)> {
    if mask & modes != 0 {
        return None;
    }
    let mut x = mask;
    let mut sign = 1.0;
    let mut rest = modes;
    while rest != 0 {
        let j = rest.trailing_zeros() as usize;
        sign *= jw_sign(x, j);
        x |= 1u64 << j;
        rest &= rest - 1;
    }
    Some((x, sign))
}

/// Sign of the permutation sorting `idx` in descending order, or `None`
/// when an index repeats.
pub(crate) fn descending_parity(idx: &[usize]) -> Option<f64> {
    let mut inversions = 0usize;
    for a in 0..idx.len() {
        for b in a + 1..idx.len() {
            if idx[a] == idx[b] {
                return None;
            }
            if idx[a] < idx[b] {
                inversions += 1;
            }
        }
    }
    Some(if inversions % 2 == 0 { 1.0 } else { -1.0 })
}

pub(crate) fn mask_of(idx: &[usize]) -> u64 {
    idx.iter().fold(0u64, |m, &i| m | (1u64 << i))
}

/// Set bits of `mask`, highest first.
pub(crate) fn modes_descending(mask: u64) -> Vec<usize> {
    (0..64).rev().filter(|&j| mask >> j & 1 == 1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dense_indexing() {
        let values: Vec<f64> = (0..9).map(|v| v as f64).collect();
        let h = SparseCoefficients::from_dense(3, 2, &values).unwrap();
        assert_eq!(h.nnz(), 8);
        assert_eq!(h.get(&[1, 2]), 5.0);
        assert_eq!(h.get(&[0, 0]), 0.0);
        assert!(SparseCoefficients::from_dense(3, 2, &values[..8]).is_err());
    }

    #[test]
    fn test_parity() {
        assert_eq!(descending_parity(&[3, 1, 0]), Some(1.0));
        assert_eq!(descending_parity(&[1, 3]), Some(-1.0));
        assert_eq!(descending_parity(&[0, 1, 2]), Some(-1.0));
        assert_eq!(descending_parity(&[2, 2]), None);
    }

    #[test]
    fn test_jordan_wigner_signs() {
        // |0b0101⟩: c_2 sees one occupied mode below
        assert_eq!(annihilate(0b0101, 0b0100), Some((0b0001, -1.0)));
        assert_eq!(create(0b0101, 0b1000), Some((0b1101, 1.0)));
        assert_eq!(create(0b0101, 0b0001), None);
        // c_2 c_0 on |0b0101⟩: c_0 first (+), then c_2 on |0b0100⟩ (+)
        assert_eq!(annihilate(0b0101, 0b0101), Some((0, 1.0)));
        assert_eq!(modes_descending(0b1010), vec![3, 1]);
    }
}
