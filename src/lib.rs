//! Rust NQS - neural quantum states optimized by variational Monte Carlo.
//!
//! The crate provides Metropolis sampling of lattice wavefunctions, the SRt
//! natural-gradient driver (stochastic reconfiguration solved in sample
//! space, with a neural-tangent-kernel variant) alongside classical SR, and
//! particle-number-conserving fermionic operators.

pub mod distributed;
pub mod driver;
pub mod error;
pub mod fermion;
pub mod hilbert;
pub mod io;
pub mod models;
pub mod operator;
pub mod optimizer;
pub mod sampling;

// Re-export commonly used types at crate root
pub use distributed::{Collective, DistributedContext, LocalCollective, ThreadCollective};
pub use driver::{
    IterationLog, JacobianMode, LinearSystemPath, Logger, NtkImplementation, NullLogger, Preconditioner,
    RuntimeLog, SrtConfig, SrtDriver, Vmc,
};
pub use error::{DistributedError, FermionError, NqsError, Result};
pub use fermion::{
    FermionOperator2nd, ParticleNumberConservingFermioperator2nd, ParticleNumberConservingFermioperator2ndSpin,
    SparseCoefficients,
};
pub use hilbert::{HilbertSpace, SpinHilbert, SpinOrbitalFermions, SquareLattice};
pub use io::{read_run_config, ModelKind, RunConfig};
pub use models::{DenseRbm, Model, ParamDtype, ParameterTree, Rbm, RbmModPhase};
pub use operator::{DiscreteOperator, Ising};
pub use optimizer::{DenseSolver, LinearSolver, Optimizer, Schedule, Sgd};
pub use sampling::{EnergyStats, MCState, MetropolisSampler, Sampler, Samples, TransitionRule};
