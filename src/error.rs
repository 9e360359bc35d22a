//! Error types shared across the crate.

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, NqsError>;

/// Top-level error for drivers, samplers and operators.
#[derive(Error, Debug)]
pub enum NqsError {
    /// Rejected at construction time, before any sampling happens.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// The regularized system could not be solved, or produced non-finite values.
    #[error("numerical instability: {0}")]
    NumericalInstability(String),
    #[error(transparent)]
    Distributed(#[from] DistributedError),
    #[error(transparent)]
    Fermion(#[from] FermionError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Failures of the collective layer. All of them are fatal for a run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DistributedError {
    #[error("shard size mismatch: rank {rank} holds {local} samples, expected {expected}")]
    ShardMismatch {
        rank: usize,
        local: usize,
        expected: usize,
    },
    #[error("collective buffer length mismatch: rank {rank} sent {len}, expected {expected}")]
    LengthMismatch {
        rank: usize,
        len: usize,
        expected: usize,
    },
    #[error("rank {rank} timed out after {waited_ms} ms waiting for {missing} participant(s)")]
    Timeout {
        rank: usize,
        waited_ms: u128,
        missing: usize,
    },
    #[error("collective group is poisoned; another rank aborted")]
    Poisoned,
}

/// Failures while building or converting fermionic operators.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FermionError {
    #[error("cannot parse fermion term {term:?}: {reason}")]
    Parse { term: String, reason: String },
    #[error("term {term:?} does not conserve particle number")]
    NotNumberConserving { term: String },
    #[error("term {term:?} does not match a spin-conserving sector pattern")]
    NotSpinConserving { term: String },
    #[error("entry {indices:?} is not normal ordered (indices must be non-increasing within creators and annihilators)")]
    NotNormalOrdered { indices: Vec<usize> },
    #[error("orbital {orbital} out of range for {n_modes} modes")]
    OrbitalOutOfRange { orbital: usize, n_modes: usize },
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("terms and weights differ in length ({terms} vs {weights})")]
    WeightCount { terms: usize, weights: usize },
}
