//! Fermion module - second-quantized operators on spin-orbital Fock spaces.
//!
//! Configurations are occupation bitmasks; the Jordan-Wigner sign of acting
//! on mode `j` is `(-1)^{#occupied modes below j}`.

mod operator2nd;
mod pnc;
mod pnc_spin;
mod sparse;

pub use operator2nd::{parse_term, FermionOp, FermionOperator2nd};
pub use pnc::ParticleNumberConservingFermioperator2nd;
pub use pnc_spin::ParticleNumberConservingFermioperator2ndSpin;
pub use sparse::SparseCoefficients;
