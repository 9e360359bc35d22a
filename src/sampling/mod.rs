//! Sampling module - Markov chain Monte Carlo over discrete configurations.

mod metropolis;
mod samples;
mod state;
mod stats;
mod traits;

pub use metropolis::{MetropolisSampler, MetropolisState, TransitionRule};
pub use samples::Samples;
pub(crate) use samples::chunk_ranges;
pub use state::MCState;
pub use stats::EnergyStats;
pub use traits::Sampler;
