//! Monte Carlo variational state: model, parameters and persistent sampler.

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::distributed::DistributedContext;
use crate::error::{NqsError, Result};
use crate::hilbert::HilbertSpace;
use crate::models::{Model, ParameterTree};
use crate::operator::{local_energy, DiscreteOperator};

use super::samples::Samples;
use super::stats::EnergyStats;
use super::traits::Sampler;

/// Variational state sampled by Markov chains.
///
/// `n_samples` is the number of samples on this process. Parameters are drawn
/// from `seed`, chains from `sampler_seed`.
pub struct MCState<M: Model, S: Sampler> {
    pub model: M,
    sampler: S,
    sampler_state: S::State,
    params: ParameterTree,
    n_samples: usize,
    samples: Option<Samples>,
}

impl<M: Model, S: Sampler> MCState<M, S> {
    pub fn new(sampler: S, model: M, n_samples: usize, seed: u64, sampler_seed: u64) -> Result<Self> {
        if n_samples == 0 || n_samples % sampler.n_chains() != 0 {
            return Err(NqsError::InvalidConfiguration(format!(
                "n_samples = {} must be a positive multiple of n_chains = {}",
                n_samples,
                sampler.n_chains()
            )));
        }
        let n_sites = sampler.hilbert().size();
        let params = model.init_params(n_sites, &mut StdRng::seed_from_u64(seed));
        let sampler_state = sampler.init_state(sampler_seed);
        Ok(Self {
            model,
            sampler,
            sampler_state,
            params,
            n_samples,
            samples: None,
        })
    }

    /// Replace the initial parameters, e.g. to start two runs from one point.
    pub fn with_parameters(mut self, params: ParameterTree) -> Self {
        self.params = params;
        self.samples = None;
        self
    }

    pub fn parameters(&self) -> &ParameterTree {
        &self.params
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterTree {
        self.samples = None;
        &mut self.params
    }

    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    pub fn sampler_state(&self) -> &S::State {
        &self.sampler_state
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    pub fn n_chains(&self) -> usize {
        self.sampler.n_chains()
    }

    pub fn n_sites(&self) -> usize {
        self.sampler.hilbert().size()
    }

    /// Draw a fresh batch, continuing every chain from where it stopped.
    pub fn sample(&mut self) -> &Samples {
        let batch = self
            .sampler
            .sample(&self.model, &self.params, &mut self.sampler_state, self.n_samples);
        self.samples.insert(batch)
    }

    /// Last drawn batch, if parameters have not changed since.
    pub fn samples(&self) -> Option<&Samples> {
        self.samples.as_ref()
    }

    pub fn log_psi(&self, x: &[f64]) -> Complex64 {
        self.model.log_psi(&self.params, x)
    }

    pub fn local_energies<O>(&self, op: &O, samples: &Samples) -> Vec<Complex64>
    where
        O: DiscreteOperator,
    {
        samples
            .rows()
            .map(|x| local_energy(op, &self.model, &self.params, x))
            .collect()
    }

    /// Sample and estimate `⟨O⟩`.
    pub fn expect<O>(&mut self, op: &O, ctx: &DistributedContext) -> Result<EnergyStats>
    where
        O: DiscreteOperator,
    {
        self.sample();
        let samples = self.samples.as_ref().ok_or_else(|| {
            NqsError::InvalidConfiguration("sampler returned no batch".to_string())
        })?;
        let e_loc = self.local_energies(op, samples);
        Ok(EnergyStats::compute(&e_loc, self.n_chains(), ctx)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::{SpinHilbert, SquareLattice};
    use crate::models::Rbm;
    use crate::operator::Ising;
    use crate::sampling::MetropolisSampler;

    #[test]
    fn test_rejects_batch_not_divisible_by_chains() {
        let sampler = MetropolisSampler::local(SpinHilbert::new(4), 3).unwrap();
        assert!(matches!(
            MCState::new(sampler, Rbm::default(), 16, 0, 1),
            Err(NqsError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_expect_is_close_to_exact_for_small_system() {
        let lattice = SquareLattice::new(2, 1);
        let hi = SpinHilbert::new(4);
        let ham = Ising::new(hi.clone(), &lattice, 1.0);
        let sampler = MetropolisSampler::local(hi, 8).unwrap();
        let mut vs = MCState::new(sampler, Rbm::default(), 4096, 0, 1).unwrap();
        let stats = vs.expect(&ham, &DistributedContext::local()).unwrap();
        assert!(stats.mean.re.is_finite());
        assert!(stats.mean.im.abs() < 1e-12);

        // exact ⟨H⟩ from the dense matrix and normalized |ψ|²
        let states = ham.hilbert().all_states().unwrap();
        let weights: Vec<f64> = states.iter().map(|x| (2.0 * vs.log_psi(x).re).exp()).collect();
        let norm: f64 = weights.iter().sum();
        let dense = ham.to_dense().unwrap();
        let psi: Vec<f64> = weights.iter().map(|w| w.sqrt()).collect();
        let mut exact = 0.0;
        for i in 0..states.len() {
            for j in 0..states.len() {
                exact += psi[i] * dense[(i, j)] * psi[j];
            }
        }
        exact /= norm;
        assert!((stats.mean.re - exact).abs() < 6.0 * stats.error_of_mean + 1e-6);
    }
}
