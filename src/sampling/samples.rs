//! Batches of configurations drawn by a sampler.

/// Row-major batch of `len()` configurations of `n_sites` entries each.
///
/// Rows are grouped by chain: row `c * per_chain + t` is the `t`-th sample of
/// chain `c`.
#[derive(Debug, Clone, PartialEq)]
pub struct Samples {
    pub n_sites: usize,
    pub n_chains: usize,
    data: Vec<f64>,
}

impl Samples {
    pub fn new(n_sites: usize, n_chains: usize, data: Vec<f64>) -> Self {
        debug_assert!(n_sites == 0 || data.len() % n_sites == 0);
        Self { n_sites, n_chains, data }
    }

    pub fn from_rows(n_sites: usize, n_chains: usize, rows: &[Vec<f64>]) -> Self {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        Self::new(n_sites, n_chains, data)
    }

    pub fn len(&self) -> usize {
        if self.n_sites == 0 {
            0
        } else {
            self.data.len() / self.n_sites
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn per_chain(&self) -> usize {
        self.len() / self.n_chains.max(1)
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.n_sites..(i + 1) * self.n_sites]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        self.data.chunks(self.n_sites.max(1))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Contiguous row ranges of at most `chunk_size` rows (one range when `None`).
    pub fn chunk_ranges(&self, chunk_size: Option<usize>) -> Vec<std::ops::Range<usize>> {
        chunk_ranges(self.len(), chunk_size)
    }
}

pub(crate) fn chunk_ranges(n: usize, chunk_size: Option<usize>) -> Vec<std::ops::Range<usize>> {
    let step = match chunk_size {
        Some(c) if c > 0 => c,
        _ => n.max(1),
    };
    (0..n)
        .step_by(step)
        .map(|start| start..(start + step).min(n))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_and_chunks() {
        let s = Samples::from_rows(2, 1, &[vec![1.0, -1.0], vec![-1.0, -1.0], vec![1.0, 1.0]]);
        assert_eq!(s.len(), 3);
        assert_eq!(s.row(1), &[-1.0, -1.0]);
        assert_eq!(s.chunk_ranges(Some(2)), vec![0..2, 2..3]);
        assert_eq!(s.chunk_ranges(None), vec![0..3]);
        assert_eq!(s.rows().count(), 3);
    }
}
