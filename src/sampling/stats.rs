//! Monte Carlo statistics of local estimators.

use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use crate::distributed::DistributedContext;
use crate::error::DistributedError;

/// Mean and uncertainty of a sampled estimator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyStats {
    pub mean: Complex64,
    /// `⟨|E - Ē|²⟩` over all samples
    pub variance: f64,
    /// Standard error of the mean from chain blocking
    pub error_of_mean: f64,
    /// Integrated autocorrelation time estimated from the chain blocks
    pub tau_corr: f64,
    pub n_samples: usize,
}

impl std::fmt::Display for EnergyStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.8} ± {:.2e} [σ²={:.4e}, τ={:.2}]",
            self.mean.re, self.error_of_mean, self.variance, self.tau_corr
        )
    }
}

impl EnergyStats {
    /// Statistics of `values`, laid out chain-major over `n_chains` local chains.
    ///
    /// Every rank must call this with its own shard; the result is identical
    /// on all ranks.
    pub fn compute(
        values: &[Complex64],
        n_chains: usize,
        ctx: &DistributedContext,
    ) -> Result<Self, DistributedError> {
        let n_chains = n_chains.max(1);
        let mut totals = [
            values.iter().map(|z| z.re).sum::<f64>(),
            values.iter().map(|z| z.im).sum::<f64>(),
            values.len() as f64,
            n_chains as f64,
        ];
        ctx.all_reduce_sum(&mut totals)?;
        let n = totals[2];
        if n == 0.0 {
            return Ok(Self {
                mean: Complex64::new(f64::NAN, f64::NAN),
                variance: f64::NAN,
                error_of_mean: f64::NAN,
                tau_corr: f64::NAN,
                n_samples: 0,
            });
        }
        let mean = Complex64::new(totals[0] / n, totals[1] / n);
        let n_blocks = totals[3];

        // Blocks are whole chains, as in the blocking error estimate.
        let block_size = values.len() / n_chains;
        let block_dev: f64 = if block_size == 0 {
            0.0
        } else {
            values
                .chunks(block_size)
                .map(|block| {
                    let m = block.iter().sum::<Complex64>() / block_size as f64;
                    (m - mean).norm_sqr()
                })
                .sum()
        };
        let mut sums = [values.iter().map(|z| (z - mean).norm_sqr()).sum::<f64>(), block_dev];
        ctx.all_reduce_sum(&mut sums)?;

        let variance = sums[0] / n;
        let (error_of_mean, tau_corr) = if n_blocks < 2.0 || block_size == 0 {
            ((variance / n).sqrt(), 0.0)
        } else {
            let block_var = sums[1] / (n_blocks - 1.0);
            let tau = if variance > 0.0 {
                (0.5 * (block_size as f64 * block_var / variance - 1.0)).max(0.0)
            } else {
                0.0
            };
            ((block_var / n_blocks).sqrt(), tau)
        };

        Ok(Self {
            mean,
            variance,
            error_of_mean,
            tau_corr,
            n_samples: n as usize,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stats_of_constant_values() {
        let values = vec![Complex64::new(-2.0, 0.0); 12];
        let stats = EnergyStats::compute(&values, 3, &DistributedContext::local()).unwrap();
        assert_relative_eq!(stats.mean.re, -2.0);
        assert_relative_eq!(stats.variance, 0.0);
        assert_relative_eq!(stats.error_of_mean, 0.0);
        assert_eq!(stats.n_samples, 12);
    }

    #[test]
    fn test_blocking_error() {
        // two chains with means 1 and 3
        let values: Vec<Complex64> = [1.0, 1.0, 3.0, 3.0]
            .iter()
            .map(|&v| Complex64::new(v, 0.0))
            .collect();
        let stats = EnergyStats::compute(&values, 2, &DistributedContext::local()).unwrap();
        assert_relative_eq!(stats.mean.re, 2.0);
        assert_relative_eq!(stats.variance, 1.0);
        // block variance (1 + 1) / 1 = 2, error sqrt(2 / 2)
        assert_relative_eq!(stats.error_of_mean, 1.0);
    }
}
