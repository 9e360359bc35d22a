//! Metropolis-Hastings sampling over discrete Hilbert spaces.
//!
//! Chains are persistent: every call to `sample` continues from the last
//! configuration of each chain, and the single seeded RNG stream advances
//! deterministically (steps outer, chains inner).

use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{NqsError, Result};
use crate::hilbert::{HilbertSpace, SquareLattice};
use crate::models::{Model, ParameterTree};

use super::samples::Samples;
use super::traits::Sampler;

/// Symmetric proposal rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TransitionRule {
    /// Flip one uniformly chosen site.
    Local,
    /// Swap the local states of a uniformly chosen site pair.
    Exchange { pairs: Vec<(usize, usize)> },
}

impl TransitionRule {
    /// Exchange moves between sites at graph distance `1..=d_max`.
    pub fn exchange(lattice: &SquareLattice, d_max: usize) -> Self {
        TransitionRule::Exchange { pairs: lattice.pairs_within(d_max) }
    }

    fn propose<H: HilbertSpace, R: Rng + ?Sized>(&self, hilbert: &H, x: &mut [f64], rng: &mut R) {
        match self {
            TransitionRule::Local => {
                let i = rng.gen_range(0..x.len());
                hilbert.flip_site(x, i);
            }
            TransitionRule::Exchange { pairs } => {
                if pairs.is_empty() {
                    return;
                }
                let (i, j) = pairs[rng.gen_range(0..pairs.len())];
                x.swap(i, j);
            }
        }
    }
}

/// Chain positions and RNG carried between sampling calls.
#[derive(Debug, Clone)]
pub struct MetropolisState {
    pub chains: Vec<Vec<f64>>,
    rng: StdRng,
    pub n_accepted: usize,
    pub n_proposed: usize,
}

impl MetropolisState {
    pub fn acceptance(&self) -> f64 {
        if self.n_proposed == 0 {
            0.0
        } else {
            self.n_accepted as f64 / self.n_proposed as f64
        }
    }
}

/// Metropolis sampler with `n_chains` chains of `sweep_size` proposals per sample.
#[derive(Debug, Clone)]
pub struct MetropolisSampler<H: HilbertSpace> {
    pub hilbert: H,
    pub rule: TransitionRule,
    pub n_chains: usize,
    /// Proposals between recorded samples; defaults to the number of sites.
    pub sweep_size: usize,
    /// Sweeps thrown away at the start of every `sample` call.
    pub n_discard_per_chain: usize,
}

impl<H: HilbertSpace> MetropolisSampler<H> {
    /// Fails when `rule` can leave the space: single-site flips on a space
    /// with fixed magnetization or particle number.
    pub fn new(hilbert: H, rule: TransitionRule, n_chains: usize) -> Result<Self> {
        if rule == TransitionRule::Local && hilbert.is_constrained() {
            return Err(NqsError::InvalidConfiguration(
                "local flips do not conserve the constrained quantum number; use an exchange rule".to_string(),
            ));
        }
        let sweep_size = hilbert.size();
        Ok(Self {
            hilbert,
            rule,
            n_chains: n_chains.max(1),
            sweep_size,
            n_discard_per_chain: 0,
        })
    }

    pub fn local(hilbert: H, n_chains: usize) -> Result<Self> {
        Self::new(hilbert, TransitionRule::Local, n_chains)
    }

    pub fn with_sweep_size(mut self, sweep_size: usize) -> Self {
        self.sweep_size = sweep_size.max(1);
        self
    }

    pub fn with_n_discard_per_chain(mut self, n: usize) -> Self {
        self.n_discard_per_chain = n;
        self
    }

    /// One sweep of `sweep_size` Metropolis steps on a single chain.
    fn sweep<M: Model>(
        &self,
        model: &M,
        params: &ParameterTree,
        x: &mut Vec<f64>,
        log_psi: &mut Complex64,
        rng: &mut StdRng,
        counts: &mut (usize, usize),
    ) {
        let mut proposal = x.clone();
        for _ in 0..self.sweep_size {
            proposal.copy_from_slice(x);
            self.rule.propose(&self.hilbert, &mut proposal, rng);
            counts.1 += 1;
            if proposal == *x {
                counts.0 += 1;
                continue;
            }
            let log_psi_new = model.log_psi(params, &proposal);
            let acceptance_ratio = (2.0 * (log_psi_new - *log_psi).re).exp();
            if rng.gen::<f64>() < acceptance_ratio {
                x.copy_from_slice(&proposal);
                *log_psi = log_psi_new;
                counts.0 += 1;
            }
        }
    }
}

impl<H: HilbertSpace> Sampler for MetropolisSampler<H> {
    type Hilbert = H;
    type State = MetropolisState;

    fn hilbert(&self) -> &H {
        &self.hilbert
    }

    fn n_chains(&self) -> usize {
        self.n_chains
    }

    fn init_state(&self, seed: u64) -> MetropolisState {
        let mut rng = StdRng::seed_from_u64(seed);
        let chains = (0..self.n_chains)
            .map(|_| self.hilbert.random_state(&mut rng))
            .collect();
        MetropolisState { chains, rng, n_accepted: 0, n_proposed: 0 }
    }

    fn sample<M: Model>(
        &self,
        model: &M,
        params: &ParameterTree,
        state: &mut MetropolisState,
        n_samples: usize,
    ) -> Samples {
        let n_sites = self.hilbert.size();
        let per_chain = n_samples.div_ceil(self.n_chains);
        let mut data = vec![0.0; per_chain * self.n_chains * n_sites];

        // cached amplitudes are stale once parameters move
        let mut log_psi: Vec<Complex64> = state
            .chains
            .iter()
            .map(|x| model.log_psi(params, x))
            .collect();
        let mut counts = (0, 0);

        for _ in 0..self.n_discard_per_chain {
            for (x, lp) in state.chains.iter_mut().zip(log_psi.iter_mut()) {
                self.sweep(model, params, x, lp, &mut state.rng, &mut counts);
            }
        }
        for t in 0..per_chain {
            for (c, (x, lp)) in state.chains.iter_mut().zip(log_psi.iter_mut()).enumerate() {
                self.sweep(model, params, x, lp, &mut state.rng, &mut counts);
                let row = c * per_chain + t;
                data[row * n_sites..(row + 1) * n_sites].copy_from_slice(x);
            }
        }

        state.n_accepted += counts.0;
        state.n_proposed += counts.1;
        trace!(
            n_samples = per_chain * self.n_chains,
            acceptance = counts.0 as f64 / counts.1.max(1) as f64,
            "metropolis batch"
        );
        Samples::new(n_sites, self.n_chains, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hilbert::{SpinHilbert, SpinOrbitalFermions};
    use crate::models::Rbm;

    #[test]
    fn test_exchange_conserves_magnetization() {
        let lattice = SquareLattice::new(3, 2);
        let hi = SpinHilbert::new(9).with_total_sz(0.5);
        let sampler = MetropolisSampler::new(hi.clone(), TransitionRule::exchange(&lattice, 2), 4).unwrap();
        let model = Rbm::default();
        let params = model.init_params(9, &mut StdRng::seed_from_u64(1));
        let mut state = sampler.init_state(7);
        let samples = sampler.sample(&model, &params, &mut state, 32);
        assert_eq!(samples.len(), 32);
        for x in samples.rows() {
            assert!(hi.state_index(x).is_some());
            assert_eq!(x.iter().filter(|&&v| v > 0.0).count(), 5);
        }
    }

    #[test]
    fn test_exchange_conserves_fermion_number() {
        let lattice = SquareLattice::new(2, 1);
        let hi = SpinOrbitalFermions::new(4, Some(2)).unwrap();
        let sampler = MetropolisSampler::new(hi, TransitionRule::exchange(&lattice, 1), 2).unwrap();
        let model = Rbm::default();
        let params = model.init_params(4, &mut StdRng::seed_from_u64(3));
        let mut state = sampler.init_state(11);
        let samples = sampler.sample(&model, &params, &mut state, 8);
        for x in samples.rows() {
            assert_eq!(x.iter().sum::<f64>(), 2.0);
        }
    }

    #[test]
    fn test_sampling_is_reproducible() {
        let hi = SpinHilbert::new(4);
        let sampler = MetropolisSampler::local(hi, 2).unwrap();
        let model = Rbm::default();
        let params = model.init_params(4, &mut StdRng::seed_from_u64(0));
        let mut a = sampler.init_state(5);
        let mut b = sampler.init_state(5);
        assert_eq!(
            sampler.sample(&model, &params, &mut a, 16),
            sampler.sample(&model, &params, &mut b, 16)
        );
        // chains persist between calls
        let next = sampler.sample(&model, &params, &mut a, 16);
        assert_eq!(next, sampler.sample(&model, &params, &mut b, 16));
        assert!(a.acceptance() > 0.0);
    }

    #[test]
    fn test_local_rule_rejected_on_constrained_space() {
        let hi = SpinHilbert::new(4).with_total_sz(0.0);
        assert!(matches!(
            MetropolisSampler::local(hi, 2),
            Err(NqsError::InvalidConfiguration(_))
        ));
        let hi = SpinOrbitalFermions::new(4, Some(2)).unwrap();
        assert!(MetropolisSampler::local(hi, 2).is_err());
        assert!(MetropolisSampler::local(SpinOrbitalFermions::new(4, None).unwrap(), 2).is_ok());
    }

    #[test]
    fn test_large_lattice_initializes_and_samples() {
        let lattice = SquareLattice::new(9, 2);
        let sampler = MetropolisSampler::local(SpinHilbert::new(lattice.n_sites()), 2).unwrap();
        let model = Rbm::default();
        let params = model.init_params(81, &mut StdRng::seed_from_u64(2));
        let mut state = sampler.init_state(0);
        let samples = sampler.sample(&model, &params, &mut state, 4);
        assert_eq!(samples.len(), 4);
        assert!(samples.rows().all(|x| x.len() == 81));
    }
}
