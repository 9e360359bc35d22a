//! Per-sample log-derivative rows, realified, centered and scaled.
//!
//! Rows of a sample `s` occupy `r·s .. r·(s+1)` where `r` is the number of
//! rows per sample of the mode. Work is done in chunks of samples so that
//! only `chunk_size · r` rows exist at any time unless the dense matrix is
//! explicitly requested.

use std::ops::Range;

use nalgebra::{DMatrix, DVector};
use num_complex::Complex64;

use crate::distributed::DistributedContext;
use crate::error::Result;
use crate::models::{Model, ParameterTree};
use crate::sampling::{chunk_ranges, Samples};

use super::config::JacobianMode;
use super::system::{JacobianOperator, NtkImplementation};

/// Evaluates realified Jacobian rows of a model at fixed parameters.
pub struct JacobianProvider<'a, M: Model> {
    model: &'a M,
    params: &'a ParameterTree,
    mode: JacobianMode,
    chunk_size: Option<usize>,
    /// `(offset, len)` of every complex leaf in real coordinates
    complex_leaves: Vec<(usize, usize)>,
    n_params: usize,
}

impl<'a, M: Model> JacobianProvider<'a, M> {
    pub fn new(model: &'a M, params: &'a ParameterTree, mode: JacobianMode, chunk_size: Option<usize>) -> Self {
        let complex_leaves = params
            .layout()
            .values()
            .filter(|leaf| leaf.complex)
            .map(|leaf| (leaf.offset, leaf.len))
            .collect();
        Self {
            model,
            params,
            mode,
            chunk_size,
            complex_leaves,
            n_params: params.n_real_coords(),
        }
    }

    pub fn mode(&self) -> JacobianMode {
        self.mode
    }

    pub fn n_params(&self) -> usize {
        self.n_params
    }

    pub fn rows_per_sample(&self) -> usize {
        self.mode.rows_per_sample()
    }

    fn write_rows(&self, block: &mut DMatrix<f64>, row: usize, g: &DVector<Complex64>) {
        match self.mode {
            JacobianMode::Real => {
                for (k, o) in g.iter().enumerate() {
                    block[(row, k)] = o.re;
                }
            }
            JacobianMode::Complex => {
                for (k, o) in g.iter().enumerate() {
                    block[(row, k)] = o.re;
                    block[(row + 1, k)] = o.im;
                }
            }
            JacobianMode::Holomorphic => {
                // d = ∂ log ψ / ∂w, realified as [Re d, -Im d] and [Im d, Re d]
                for &(offset, len) in &self.complex_leaves {
                    for j in 0..len {
                        let d = g[offset + j];
                        block[(row, offset + j)] = d.re;
                        block[(row, offset + len + j)] = -d.im;
                        block[(row + 1, offset + j)] = d.im;
                        block[(row + 1, offset + len + j)] = d.re;
                    }
                }
            }
        }
    }

    /// Uncentered rows of the samples in `range`.
    pub fn raw_rows(&self, samples: &Samples, range: Range<usize>) -> DMatrix<f64> {
        let r = self.rows_per_sample();
        let mut block = DMatrix::zeros(range.len() * r, self.n_params);
        for (i, s) in range.enumerate() {
            let g = self.model.log_psi_grad(self.params, samples.row(s));
            self.write_rows(&mut block, r * i, &g);
        }
        block
    }

    /// Column sums of each row kind, shape `(r, params)`.
    pub fn row_sums(&self, samples: &Samples) -> DMatrix<f64> {
        let r = self.rows_per_sample();
        let mut sums = DMatrix::zeros(r, self.n_params);
        for range in chunk_ranges(samples.len(), self.chunk_size) {
            let block = self.raw_rows(samples, range);
            for (i, row) in block.row_iter().enumerate() {
                let mut acc = sums.row_mut(i % r);
                acc += row;
            }
        }
        sums
    }

    /// Centered Jacobian over `samples`, where `mean` was taken over all
    /// `n_total` samples of the batch.
    pub fn centered<'p>(
        &'p self,
        samples: &'p Samples,
        mean: DMatrix<f64>,
        n_total: usize,
        implementation: NtkImplementation,
    ) -> CenteredJacobian<'p, 'a, M> {
        CenteredJacobian {
            provider: self,
            samples,
            mean,
            scale: 1.0 / (n_total as f64).sqrt(),
            implementation,
        }
    }

    /// Mean rows over `samples` as seen by every rank.
    pub fn global_mean(&self, samples: &Samples, n_total: usize, ctx: &DistributedContext) -> Result<DMatrix<f64>> {
        let mut sums = self.row_sums(samples);
        ctx.all_reduce_sum(sums.as_mut_slice())?;
        Ok(sums / n_total as f64)
    }
}

/// `(O - Ō)/√N` evaluated chunk by chunk.
pub struct CenteredJacobian<'p, 'a, M: Model> {
    provider: &'p JacobianProvider<'a, M>,
    samples: &'p Samples,
    mean: DMatrix<f64>,
    scale: f64,
    implementation: NtkImplementation,
}

impl<'p, 'a, M: Model> CenteredJacobian<'p, 'a, M> {
    fn ranges(&self) -> Vec<Range<usize>> {
        chunk_ranges(self.samples.len(), self.provider.chunk_size)
    }

    fn row_range(&self, samples: &Range<usize>) -> Range<usize> {
        let r = self.provider.rows_per_sample();
        r * samples.start..r * samples.end
    }

    /// Centered, scaled rows of the samples in `range`.
    pub fn block(&self, range: Range<usize>) -> DMatrix<f64> {
        let r = self.provider.rows_per_sample();
        let mut block = self.provider.raw_rows(self.samples, range);
        for (i, mut row) in block.row_iter_mut().enumerate() {
            row -= self.mean.row(i % r);
            row *= self.scale;
        }
        block
    }

    /// Stack every chunk into one matrix.
    pub fn to_dense(&self) -> DMatrix<f64> {
        let mut dense = DMatrix::zeros(self.n_rows(), self.n_params());
        for range in self.ranges() {
            let rows = self.row_range(&range);
            let block = self.block(range);
            dense.rows_mut(rows.start, rows.len()).copy_from(&block);
        }
        dense
    }

    fn kernel_by_contraction(&self) -> DMatrix<f64> {
        let n = self.n_rows();
        let mut kernel = DMatrix::zeros(n, n);
        let ranges = self.ranges();
        for (ia, ra) in ranges.iter().enumerate() {
            let ja = self.block(ra.clone());
            let rows_a = self.row_range(ra);
            for rb in &ranges[ia..] {
                let rows_b = self.row_range(rb);
                let kab = if rb == ra {
                    &ja * ja.transpose()
                } else {
                    &ja * self.block(rb.clone()).transpose()
                };
                kernel
                    .view_mut((rows_a.start, rows_b.start), (rows_a.len(), rows_b.len()))
                    .copy_from(&kab);
                kernel
                    .view_mut((rows_b.start, rows_a.start), (rows_b.len(), rows_a.len()))
                    .copy_from(&kab.transpose());
            }
        }
        kernel
    }

    fn kernel_by_vector_products(&self) -> DMatrix<f64> {
        let n = self.n_rows();
        let mut kernel = DMatrix::zeros(n, n);
        let mut e = DVector::zeros(n);
        for j in 0..n {
            e[j] = 1.0;
            let column = self.jvp(&self.vjp(&e));
            kernel.set_column(j, &column);
            e[j] = 0.0;
        }
        (&kernel + kernel.transpose()) * 0.5
    }
}

impl<'p, 'a, M: Model> JacobianOperator for CenteredJacobian<'p, 'a, M> {
    fn n_rows(&self) -> usize {
        self.samples.len() * self.provider.rows_per_sample()
    }

    fn n_params(&self) -> usize {
        self.provider.n_params()
    }

    fn jvp(&self, v: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(self.n_rows());
        for range in self.ranges() {
            let rows = self.row_range(&range);
            let block = self.block(range);
            out.rows_mut(rows.start, rows.len()).copy_from(&(block * v));
        }
        out
    }

    fn vjp(&self, a: &DVector<f64>) -> DVector<f64> {
        let mut out = DVector::zeros(self.n_params());
        for range in self.ranges() {
            let rows = self.row_range(&range);
            let coeffs = a.rows(rows.start, rows.len());
            if coeffs.iter().all(|&c| c == 0.0) {
                continue;
            }
            out += self.block(range).tr_mul(&coeffs);
        }
        out
    }

    fn kernel(&self) -> DMatrix<f64> {
        match self.implementation {
            NtkImplementation::JacobianContraction => self.kernel_by_contraction(),
            NtkImplementation::VectorProducts => self.kernel_by_vector_products(),
        }
    }
}

/// Residual `dv` of the local samples: `2 Re dE / √N`, or the interleaved
/// `(2 Re dE, 2 Im dE) / √N` in the two-row modes.
pub fn energy_residual(e_loc: &[Complex64], mean: Complex64, mode: JacobianMode, n_total: usize) -> DVector<f64> {
    let scale = 2.0 / (n_total as f64).sqrt();
    match mode {
        JacobianMode::Real => DVector::from_iterator(
            e_loc.len(),
            e_loc.iter().map(|e| (e - mean).re * scale),
        ),
        JacobianMode::Complex | JacobianMode::Holomorphic => DVector::from_iterator(
            2 * e_loc.len(),
            e_loc.iter().flat_map(|e| {
                let d = (e - mean) * scale;
                [d.re, d.im]
            }),
        ),
    }
}

/// Row-major gather of equally sized local row blocks.
pub fn gather_rows(local: &DMatrix<f64>, ctx: &DistributedContext) -> Result<DMatrix<f64>> {
    if ctx.size() == 1 {
        return Ok(local.clone());
    }
    let row_major = local.transpose();
    let data = ctx.all_gather(row_major.as_slice())?;
    let n_cols = local.ncols();
    let n_rows = if n_cols == 0 { 0 } else { data.len() / n_cols };
    Ok(DMatrix::from_row_slice(n_rows, n_cols, &data))
}
