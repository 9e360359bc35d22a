//! Operator module - Hamiltonians acting on discrete configurations.

mod ising;

pub use ising::Ising;

use nalgebra::DMatrix;
use num_complex::Complex64;

use crate::error::Result;
use crate::hilbert::HilbertSpace;
use crate::models::{Model, ParameterTree};

/// Operator with a sparse row structure in a discrete basis.
pub trait DiscreteOperator {
    type Hilbert: HilbertSpace;

    fn hilbert(&self) -> &Self::Hilbert;

    /// Configurations `x'` with `⟨x|H|x'⟩ ≠ 0`, paired with the matrix element.
    fn get_conn(&self, x: &[f64]) -> Vec<(Vec<f64>, f64)>;

    /// Dense matrix in the `all_states` basis. Connections leaving the
    /// constrained space are dropped.
    fn to_dense(&self) -> Result<DMatrix<f64>> {
        let hilbert = self.hilbert();
        let n = hilbert.n_states()?;
        let mut dense = DMatrix::zeros(n, n);
        for (row, x) in hilbert.all_states()?.iter().enumerate() {
            for (xp, mel) in self.get_conn(x) {
                if let Some(col) = hilbert.state_index(&xp) {
                    dense[(row, col)] += mel;
                }
            }
        }
        Ok(dense)
    }
}

/// Local energy `E_loc(x) = Σ_x' H_{x x'} ψ(x') / ψ(x)`.
pub fn local_energy<O, M>(op: &O, model: &M, params: &ParameterTree, x: &[f64]) -> Complex64
where
    O: DiscreteOperator,
    M: Model,
{
    let log_psi_x = model.log_psi(params, x);
    op.get_conn(x)
        .into_iter()
        .map(|(xp, mel)| {
            if xp.as_slice() == x {
                Complex64::new(mel, 0.0)
            } else {
                mel * (model.log_psi(params, &xp) - log_psi_x).exp()
            }
        })
        .sum()
}
