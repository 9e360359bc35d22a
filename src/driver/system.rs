//! The regularized sample-space system `(J Jᵀ + λI + p/n·11ᵀ) a = dv`.
//!
//! Both the materialized Jacobian and the lazily evaluated kernel expose the
//! same three products, so momentum, regularization and the solve are
//! written once.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::optimizer::LinearSolver;

/// How the kernel matrix is assembled when the Jacobian is never held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NtkImplementation {
    /// Blocks `J_a J_bᵀ` from recomputed chunks of Jacobian rows.
    #[default]
    JacobianContraction,
    /// Columns `J (Jᵀ e_j)` from vector-Jacobian then Jacobian-vector products.
    VectorProducts,
}

/// Which form of the Jacobian the driver builds each iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinearSystemPath {
    /// Materialize `J` (gathering rows across ranks) and contract it directly.
    #[default]
    Jacobian,
    /// Gather configurations and work through the neural tangent kernel.
    Kernel(NtkImplementation),
}

/// Products against a centered, scaled Jacobian of shape `(rows, params)`.
pub trait JacobianOperator {
    fn n_rows(&self) -> usize;

    fn n_params(&self) -> usize;

    /// `J v`
    fn jvp(&self, v: &DVector<f64>) -> DVector<f64>;

    /// `Jᵀ a`
    fn vjp(&self, a: &DVector<f64>) -> DVector<f64>;

    /// `J Jᵀ`
    fn kernel(&self) -> DMatrix<f64>;
}

impl JacobianOperator for DMatrix<f64> {
    fn n_rows(&self) -> usize {
        self.nrows()
    }

    fn n_params(&self) -> usize {
        self.ncols()
    }

    fn jvp(&self, v: &DVector<f64>) -> DVector<f64> {
        self * v
    }

    fn vjp(&self, a: &DVector<f64>) -> DVector<f64> {
        self.tr_mul(a)
    }

    fn kernel(&self) -> DMatrix<f64> {
        self * self.transpose()
    }
}

/// Regularization of one iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Regularization {
    pub diag_shift: f64,
    pub proj_reg: Option<f64>,
    pub momentum: Option<f64>,
}

/// Solve for the update `u = Jᵀ a` (plus momentum) and refresh the buffer.
///
/// `buffer` holds the previous update and is overwritten when momentum is on.
pub fn solve_update<J: JacobianOperator + ?Sized>(
    jac: &J,
    dv: DVector<f64>,
    reg: Regularization,
    buffer: &mut DVector<f64>,
    solver: &dyn LinearSolver,
) -> Result<DVector<f64>> {
    let mut dv = dv;
    if let Some(m) = reg.momentum {
        dv -= jac.jvp(buffer) * m;
    }

    let n_rows = jac.n_rows();
    let mut t = jac.kernel();
    for i in 0..n_rows {
        t[(i, i)] += reg.diag_shift;
    }
    if let Some(p) = reg.proj_reg {
        t.add_scalar_mut(p / n_rows as f64);
    }

    let a = solver.solve(&t, &dv)?;
    let mut u = jac.vjp(&a);
    if let Some(m) = reg.momentum {
        u += &*buffer * m;
        buffer.copy_from(&u);
    }
    Ok(u)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::DenseSolver;
    use approx::assert_relative_eq;

    #[test]
    fn test_sample_space_solve_matches_parameter_space() {
        // push-through: Jᵀ(JJᵀ + λ)⁻¹ dv = (JᵀJ + λ)⁻¹ Jᵀ dv
        let j = DMatrix::from_row_slice(3, 2, &[1.0, 0.5, -0.3, 2.0, 0.7, -1.1]);
        let dv = DVector::from_vec(vec![0.2, -0.4, 0.9]);
        let reg = Regularization { diag_shift: 0.1, proj_reg: None, momentum: None };
        let mut buffer = DVector::zeros(2);
        let u = solve_update(&j, dv.clone(), reg, &mut buffer, &DenseSolver::Cholesky).unwrap();

        let mut s = j.tr_mul(&j);
        for i in 0..2 {
            s[(i, i)] += 0.1;
        }
        let x = DenseSolver::Cholesky.solve(&s, &j.tr_mul(&dv)).unwrap();
        assert_relative_eq!(u, x, epsilon = 1e-12);
        assert_eq!(buffer, DVector::zeros(2));
    }

    #[test]
    fn test_momentum_updates_buffer() {
        let j = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
        let dv = DVector::from_vec(vec![1.0, 1.0]);
        let reg = Regularization { diag_shift: 0.0, proj_reg: None, momentum: Some(0.5) };
        let mut buffer = DVector::zeros(2);
        let u1 = solve_update(&j, dv.clone(), reg, &mut buffer, &DenseSolver::Cholesky).unwrap();
        assert_relative_eq!(u1, dv, epsilon = 1e-14);
        assert_eq!(buffer, u1);
        // dv - m J u_old = 0.5, then u = 0.5 + 0.5 · 1
        let u2 = solve_update(&j, dv.clone(), reg, &mut buffer, &DenseSolver::Cholesky).unwrap();
        assert_relative_eq!(u2, dv, epsilon = 1e-14);
    }
}
