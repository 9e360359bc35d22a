//! Restricted Boltzmann machine ansätze.
//!
//! All three models share the same building block: a dense layer followed
//! by `log cosh` summed over hidden units,
//!
//!   log ψ(x) = Σ_h log cosh(θ_h(x)),  θ = Wᵀx + b,
//!
//! whose derivative with respect to `θ_h` is `tanh(θ_h)`.

use std::f64::consts::LN_2;

use nalgebra::DVector;
use num_complex::Complex64;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::params::{GradientBuffer, ParamDtype, ParameterTree, Tensor};
use super::traits::Model;

/// Numerically stable `log cosh(z)` using the even symmetry of `cosh`.
pub fn log_cosh(z: Complex64) -> Complex64 {
    let z = if z.re < 0.0 { -z } else { z };
    z + (Complex64::new(1.0, 0.0) + (-2.0 * z).exp()).ln() - LN_2
}

/// `θ_h = b_h + Σ_i x_i W_ih` with a row-major `(n_in, n_out)` kernel.
fn dense(kernel: &Tensor, bias: Option<&Tensor>, input: &[Complex64]) -> Vec<Complex64> {
    let n_out = kernel.shape[1];
    let mut out: Vec<Complex64> = match bias {
        Some(b) => b.iter().collect(),
        None => vec![Complex64::new(0.0, 0.0); n_out],
    };
    for (i, xi) in input.iter().enumerate() {
        if *xi == Complex64::new(0.0, 0.0) {
            continue;
        }
        let row = i * n_out;
        for (h, o) in out.iter_mut().enumerate() {
            *o += xi * kernel.at(row + h);
        }
    }
    out
}

fn as_complex(x: &[f64]) -> Vec<Complex64> {
    x.iter().map(|&v| Complex64::new(v, 0.0)).collect()
}

/// Standard RBM, `log ψ = Σ_h log cosh(Wᵀx + b)_h + aᵀx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rbm {
    /// Hidden-unit density (hidden units per site)
    pub alpha: usize,
    pub param_dtype: ParamDtype,
    pub use_visible_bias: bool,
    pub use_hidden_bias: bool,
    /// Standard deviation of the normal initializer
    pub init_std: f64,
}

impl Default for Rbm {
    fn default() -> Self {
        Self {
            alpha: 1,
            param_dtype: ParamDtype::Real,
            use_visible_bias: true,
            use_hidden_bias: true,
            init_std: 0.01,
        }
    }
}

impl Rbm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alpha(mut self, alpha: usize) -> Self {
        self.alpha = alpha;
        self
    }

    pub fn with_param_dtype(mut self, dtype: ParamDtype) -> Self {
        self.param_dtype = dtype;
        self
    }

    pub fn with_visible_bias(mut self, v: bool) -> Self {
        self.use_visible_bias = v;
        self
    }

    pub fn with_init_std(mut self, std: f64) -> Self {
        self.init_std = std;
        self
    }

    fn complex(&self) -> bool {
        self.param_dtype != ParamDtype::Real
    }

    fn theta(&self, params: &ParameterTree, x: &[Complex64]) -> Vec<Complex64> {
        let bias = if self.use_hidden_bias {
            Some(&params["hidden_bias"])
        } else {
            None
        };
        dense(&params["kernel"], bias, x)
    }
}

impl Model for Rbm {
    fn init_params<R: Rng + ?Sized>(&self, n_sites: usize, rng: &mut R) -> ParameterTree {
        let n_hidden = self.alpha * n_sites;
        let complex = self.complex();
        let mut params = ParameterTree::new();
        params.insert("kernel", Tensor::normal(vec![n_sites, n_hidden], self.init_std, complex, rng));
        if self.use_hidden_bias {
            params.insert("hidden_bias", Tensor::normal(vec![n_hidden], self.init_std, complex, rng));
        }
        if self.use_visible_bias {
            params.insert("visible_bias", Tensor::normal(vec![n_sites], self.init_std, complex, rng));
        }
        params
    }

    fn log_psi(&self, params: &ParameterTree, x: &[f64]) -> Complex64 {
        let xc = as_complex(x);
        let mut out: Complex64 = self.theta(params, &xc).into_iter().map(log_cosh).sum();
        if self.use_visible_bias {
            let a = &params["visible_bias"];
            out += xc.iter().enumerate().map(|(i, xi)| xi * a.at(i)).sum::<Complex64>();
        }
        out
    }

    fn log_psi_grad(&self, params: &ParameterTree, x: &[f64]) -> DVector<Complex64> {
        let xc = as_complex(x);
        let t: Vec<Complex64> = self.theta(params, &xc).into_iter().map(|z| z.tanh()).collect();
        let n_hidden = t.len();
        let mut grad = GradientBuffer::new(params);
        for (i, xi) in xc.iter().enumerate() {
            for (h, th) in t.iter().enumerate() {
                grad.add("kernel", i * n_hidden + h, xi * th);
            }
        }
        if self.use_hidden_bias {
            for (h, th) in t.iter().enumerate() {
                grad.add("hidden_bias", h, *th);
            }
        }
        if self.use_visible_bias {
            for (i, xi) in xc.iter().enumerate() {
                grad.add("visible_bias", i, *xi);
            }
        }
        grad.finish()
    }

    fn has_real_output(&self) -> bool {
        !self.complex()
    }

    fn is_holomorphic(&self) -> bool {
        self.param_dtype == ParamDtype::Complex
    }
}

/// Real-parameter RBM with separate modulus and phase networks,
/// `log ψ = Σ log cosh(θᵐ) + i Σ log cosh(θᵖ)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbmModPhase {
    pub alpha: usize,
    pub use_hidden_bias: bool,
    pub init_std: f64,
}

impl Default for RbmModPhase {
    fn default() -> Self {
        Self {
            alpha: 1,
            use_hidden_bias: true,
            init_std: 0.01,
        }
    }
}

impl RbmModPhase {
    pub fn new() -> Self {
        Self::default()
    }

    fn branch(&self, params: &ParameterTree, prefix: &str, x: &[Complex64]) -> Vec<Complex64> {
        let bias = if self.use_hidden_bias {
            Some(&params[format!("{prefix}/hidden_bias").as_str()])
        } else {
            None
        };
        dense(&params[format!("{prefix}/kernel").as_str()], bias, x)
    }
}

impl Model for RbmModPhase {
    fn init_params<R: Rng + ?Sized>(&self, n_sites: usize, rng: &mut R) -> ParameterTree {
        let n_hidden = self.alpha * n_sites;
        let mut params = ParameterTree::new();
        for prefix in ["modulus", "phase"] {
            params.insert(
                format!("{prefix}/kernel"),
                Tensor::normal(vec![n_sites, n_hidden], self.init_std, false, rng),
            );
            if self.use_hidden_bias {
                params.insert(
                    format!("{prefix}/hidden_bias"),
                    Tensor::normal(vec![n_hidden], self.init_std, false, rng),
                );
            }
        }
        params
    }

    fn log_psi(&self, params: &ParameterTree, x: &[f64]) -> Complex64 {
        let xc = as_complex(x);
        let re: Complex64 = self.branch(params, "modulus", &xc).into_iter().map(log_cosh).sum();
        let im: Complex64 = self.branch(params, "phase", &xc).into_iter().map(log_cosh).sum();
        re + Complex64::i() * im
    }

    fn log_psi_grad(&self, params: &ParameterTree, x: &[f64]) -> DVector<Complex64> {
        let xc = as_complex(x);
        let mut grad = GradientBuffer::new(params);
        for (prefix, factor) in [("modulus", Complex64::new(1.0, 0.0)), ("phase", Complex64::i())] {
            let t: Vec<Complex64> = self.branch(params, prefix, &xc).into_iter().map(|z| z.tanh()).collect();
            let n_hidden = t.len();
            let kernel = format!("{prefix}/kernel");
            for (i, xi) in xc.iter().enumerate() {
                for (h, th) in t.iter().enumerate() {
                    grad.add(&kernel, i * n_hidden + h, factor * xi * th);
                }
            }
            if self.use_hidden_bias {
                let bias = format!("{prefix}/hidden_bias");
                for (h, th) in t.iter().enumerate() {
                    grad.add(&bias, h, factor * th);
                }
            }
        }
        grad.finish()
    }

    fn has_real_output(&self) -> bool {
        false
    }
}

/// Two stacked real dense layers with an optional imaginary mixing layer:
///
///   y = W_rᵀx + b_r,   z = y + i·W_iᵀy (if `complex_phase`),
///   log ψ = Σ_h log cosh(z_h).
///
/// Without the phase layer the output is real-valued; `real_output` decides
/// whether the model declares it as real or as complex.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseRbm {
    pub n_hidden: usize,
    pub complex_phase: bool,
    pub real_output: bool,
    pub init_std: f64,
}

impl DenseRbm {
    pub fn new(n_hidden: usize, complex_phase: bool) -> Self {
        Self {
            n_hidden,
            complex_phase,
            real_output: false,
            init_std: 0.02,
        }
    }

    pub fn with_real_output(mut self, real_output: bool) -> Self {
        self.real_output = real_output;
        self
    }

    fn forward(&self, params: &ParameterTree, x: &[Complex64]) -> (Vec<Complex64>, Vec<Complex64>) {
        let y = dense(&params["dense_r/kernel"], Some(&params["dense_r/bias"]), x);
        let z = if self.complex_phase {
            let mixed = dense(&params["dense_i/kernel"], None, &y);
            y.iter().zip(mixed).map(|(a, b)| a + Complex64::i() * b).collect()
        } else {
            y.clone()
        };
        (y, z)
    }
}

impl Model for DenseRbm {
    fn init_params<R: Rng + ?Sized>(&self, n_sites: usize, rng: &mut R) -> ParameterTree {
        let mut params = ParameterTree::new()
            .with("dense_r/kernel", Tensor::normal(vec![n_sites, self.n_hidden], self.init_std, false, rng))
            .with("dense_r/bias", Tensor::normal(vec![self.n_hidden], self.init_std, false, rng));
        if self.complex_phase {
            params.insert(
                "dense_i/kernel",
                Tensor::normal(vec![self.n_hidden, self.n_hidden], self.init_std, false, rng),
            );
        }
        params
    }

    fn log_psi(&self, params: &ParameterTree, x: &[f64]) -> Complex64 {
        let (_, z) = self.forward(params, &as_complex(x));
        z.into_iter().map(log_cosh).sum()
    }

    fn log_psi_grad(&self, params: &ParameterTree, x: &[f64]) -> DVector<Complex64> {
        let xc = as_complex(x);
        let (y, z) = self.forward(params, &xc);
        let t: Vec<Complex64> = z.iter().map(|z| z.tanh()).collect();
        let nh = self.n_hidden;
        let mut grad = GradientBuffer::new(params);

        // v_g = ∂ log ψ / ∂y_g = t_g + i Σ_h W_i[g, h] t_h
        let v: Vec<Complex64> = if self.complex_phase {
            let w_i = &params["dense_i/kernel"];
            for (g, yg) in y.iter().enumerate() {
                for (h, th) in t.iter().enumerate() {
                    grad.add("dense_i/kernel", g * nh + h, Complex64::i() * yg * th);
                }
            }
            (0..nh)
                .map(|g| {
                    let mix: Complex64 = (0..nh).map(|h| w_i.at(g * nh + h) * t[h]).sum();
                    t[g] + Complex64::i() * mix
                })
                .collect()
        } else {
            t
        };
        for (k, xk) in xc.iter().enumerate() {
            for (g, vg) in v.iter().enumerate() {
                grad.add("dense_r/kernel", k * nh + g, xk * vg);
            }
        }
        for (g, vg) in v.iter().enumerate() {
            grad.add("dense_r/bias", g, *vg);
        }
        grad.finish()
    }

    fn has_real_output(&self) -> bool {
        !self.complex_phase && self.real_output
    }
}
