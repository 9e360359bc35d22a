//! Trait for variational wavefunctions over discrete configurations.

use nalgebra::DVector;
use num_complex::Complex64;
use rand::Rng;

use super::params::ParameterTree;

/// A parameterized map from configurations to `log ψ(x)`.
///
/// Gradients are taken with respect to the real coordinates of the parameter
/// tree (see [`ParameterTree::to_real_coords`]). They are the analytic
/// counterpart of what an autodiff engine would return.
pub trait Model {
    /// Initialize parameters for inputs of length `n_sites`.
    fn init_params<R: Rng + ?Sized>(&self, n_sites: usize, rng: &mut R) -> ParameterTree;

    /// Evaluate `log ψ(x)`.
    fn log_psi(&self, params: &ParameterTree, x: &[f64]) -> Complex64;

    /// Compute `O_k(x) = ∂ log ψ(x) / ∂θ_k` for every real coordinate `θ_k`.
    fn log_psi_grad(&self, params: &ParameterTree, x: &[f64]) -> DVector<Complex64>;

    /// Whether `log ψ` is real for real parameters.
    fn has_real_output(&self) -> bool;

    /// Whether `log ψ` is holomorphic in its (complex) parameters.
    fn is_holomorphic(&self) -> bool {
        false
    }

    /// Central-difference gradient, for checking `log_psi_grad`.
    fn numerical_log_psi_grad(&self, params: &ParameterTree, x: &[f64], h: f64) -> DVector<Complex64> {
        let n = params.n_real_coords();
        let mut grad = DVector::zeros(n);
        for k in 0..n {
            let mut step = DVector::zeros(n);
            step[k] = h;
            let mut fwd = params.clone();
            fwd.add_real_coords(&step);
            let mut bwd = params.clone();
            bwd.add_real_coords(&(-step));
            grad[k] = (self.log_psi(&fwd, x) - self.log_psi(&bwd, x)) / (2.0 * h);
        }
        grad
    }
}
