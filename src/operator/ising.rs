//! Transverse-field Ising model.

use serde::{Deserialize, Serialize};

use super::DiscreteOperator;
use crate::hilbert::{SpinHilbert, SquareLattice};

/// `H = J Σ_<ij> σᶻ_i σᶻ_j − h Σ_i σˣ_i` on the nearest-neighbor bonds of a lattice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ising {
    pub hilbert: SpinHilbert,
    pub edges: Vec<(usize, usize)>,
    /// Transverse field
    pub h: f64,
    /// Coupling (negative is ferromagnetic)
    pub j: f64,
}

impl Ising {
    pub fn new(hilbert: SpinHilbert, lattice: &SquareLattice, h: f64) -> Self {
        Self {
            hilbert,
            edges: lattice.edges_of_order(1),
            h,
            j: 1.0,
        }
    }

    pub fn with_coupling(mut self, j: f64) -> Self {
        self.j = j;
        self
    }

    fn diagonal(&self, x: &[f64]) -> f64 {
        self.j * self.edges.iter().map(|&(a, b)| x[a] * x[b]).sum::<f64>()
    }
}

impl DiscreteOperator for Ising {
    type Hilbert = SpinHilbert;

    fn hilbert(&self) -> &SpinHilbert {
        &self.hilbert
    }

    fn get_conn(&self, x: &[f64]) -> Vec<(Vec<f64>, f64)> {
        let mut conn = Vec::with_capacity(x.len() + 1);
        conn.push((x.to_vec(), self.diagonal(x)));
        if self.h != 0.0 {
            for i in 0..x.len() {
                let mut flipped = x.to_vec();
                flipped[i] = -flipped[i];
                conn.push((flipped, -self.h));
            }
        }
        conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::HilbertSpace;
    use approx::assert_relative_eq;

    #[test]
    fn test_ising_dense_is_symmetric() {
        let lattice = SquareLattice::new(2, 1);
        let ha = Ising::new(SpinHilbert::new(lattice.n_sites()), &lattice, 0.7);
        let dense = ha.to_dense().unwrap();
        assert_eq!(dense.nrows(), 16);
        assert_relative_eq!(dense.clone(), dense.transpose(), epsilon = 1e-14);
    }

    #[test]
    fn test_ising_classical_limit() {
        let lattice = SquareLattice::new(3, 1);
        let hi = SpinHilbert::new(lattice.n_sites());
        let ha = Ising::new(hi.clone(), &lattice, 0.0).with_coupling(-1.0);
        let all_up = vec![1.0; hi.size()];
        let conn = ha.get_conn(&all_up);
        assert_eq!(conn.len(), 1);
        assert_relative_eq!(conn[0].1, -(ha.edges.len() as f64));
    }
}
