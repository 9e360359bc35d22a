//! Dense solvers for the regularized symmetric systems.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{NqsError, Result};

/// Solve `A x = b` for a real symmetric `A`.
pub trait LinearSolver {
    fn solve(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>>;
}

impl<F> LinearSolver for F
where
    F: Fn(&DMatrix<f64>, &DVector<f64>) -> Result<DVector<f64>>,
{
    fn solve(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
        self(a, b)
    }
}

/// Built-in solvers, selectable from configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenseSolver {
    /// Requires a positive-definite matrix.
    #[default]
    Cholesky,
    Lu,
    /// Pseudo-inverse through the eigendecomposition, with eigenvalues below
    /// `rtol · λ_max` dropped and small ones smoothly damped.
    PinvSmooth { rtol: f64, rtol_smooth: f64 },
}

impl DenseSolver {
    pub fn pinv_smooth() -> Self {
        DenseSolver::PinvSmooth { rtol: 1e-14, rtol_smooth: 1e-14 }
    }
}

impl LinearSolver for DenseSolver {
    fn solve(&self, a: &DMatrix<f64>, b: &DVector<f64>) -> Result<DVector<f64>> {
        let x = match *self {
            DenseSolver::Cholesky => a
                .clone()
                .cholesky()
                .map(|c| c.solve(b))
                .ok_or_else(|| {
                    warn!(dim = a.nrows(), "cholesky failed on regularized system");
                    NqsError::NumericalInstability(
                        "matrix is not positive definite; increase diag_shift".to_string(),
                    )
                })?,
            DenseSolver::Lu => a.clone().lu().solve(b).ok_or_else(|| {
                NqsError::NumericalInstability("singular matrix in LU solve".to_string())
            })?,
            DenseSolver::PinvSmooth { rtol, rtol_smooth } => pinv_smooth_solve(a, b, rtol, rtol_smooth),
        };
        if x.iter().all(|v| v.is_finite()) {
            Ok(x)
        } else {
            Err(NqsError::NumericalInstability(
                "linear solve produced non-finite values".to_string(),
            ))
        }
    }
}

fn pinv_smooth_solve(a: &DMatrix<f64>, b: &DVector<f64>, rtol: f64, rtol_smooth: f64) -> DVector<f64> {
    let eig = a.clone().symmetric_eigen();
    let scale = eig.eigenvalues.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    if scale == 0.0 {
        return DVector::zeros(b.len());
    }
    let qt_b = eig.eigenvectors.transpose() * b;
    let damped = DVector::from_iterator(
        qt_b.len(),
        eig.eigenvalues.iter().zip(qt_b.iter()).map(|(&lambda, &c)| {
            let rel = lambda.abs() / scale;
            if rel < rtol {
                0.0
            } else {
                let smooth = 1.0 / (1.0 + (rtol_smooth / rel).powi(6));
                c * smooth / lambda
            }
        }),
    );
    &eig.eigenvectors * damped
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn spd() -> (DMatrix<f64>, DVector<f64>) {
        let a = DMatrix::from_row_slice(3, 3, &[4.0, 1.0, 0.5, 1.0, 3.0, 0.2, 0.5, 0.2, 2.0]);
        let b = DVector::from_vec(vec![1.0, -1.0, 0.5]);
        (a, b)
    }

    #[test]
    fn test_solvers_agree_on_spd_system() {
        let (a, b) = spd();
        let x = DenseSolver::Cholesky.solve(&a, &b).unwrap();
        for solver in [DenseSolver::Lu, DenseSolver::pinv_smooth()] {
            let y = solver.solve(&a, &b).unwrap();
            assert_relative_eq!(x, y, epsilon = 1e-10);
        }
        assert_relative_eq!(&a * x, b, epsilon = 1e-12);
    }

    #[test]
    fn test_cholesky_rejects_indefinite() {
        let a = DMatrix::from_row_slice(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        let b = DVector::from_vec(vec![1.0, 1.0]);
        assert!(matches!(
            DenseSolver::Cholesky.solve(&a, &b),
            Err(NqsError::NumericalInstability(_))
        ));
    }

    #[test]
    fn test_closure_solver() {
        let (a, b) = spd();
        let solver = |m: &DMatrix<f64>, r: &DVector<f64>| DenseSolver::Lu.solve(m, r);
        let x = solver.solve(&a, &b).unwrap();
        assert_relative_eq!(&a * x, b, epsilon = 1e-12);
    }
}
