//! Traits for Monte Carlo sampling.

use crate::hilbert::HilbertSpace;
use crate::models::{Model, ParameterTree};

use super::samples::Samples;

/// Draws configurations distributed according to `|ψ(x)|²`.
///
/// The sampler itself is immutable configuration; everything that evolves
/// between calls (chain positions, RNG) lives in `Self::State`.
pub trait Sampler {
    type Hilbert: HilbertSpace;
    type State;

    fn hilbert(&self) -> &Self::Hilbert;

    /// Number of independent chains on this rank.
    fn n_chains(&self) -> usize;

    fn init_state(&self, seed: u64) -> Self::State;

    /// Draw `n_samples` configurations (a multiple of `n_chains`).
    fn sample<M: Model>(
        &self,
        model: &M,
        params: &ParameterTree,
        state: &mut Self::State,
        n_samples: usize,
    ) -> Samples;
}
