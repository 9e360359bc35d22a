//! Driver module - optimization loops for variational states.

mod config;
mod jacobian;
mod logger;
mod srt;
mod system;
mod vmc;

pub use config::{JacobianMode, SrtConfig};
pub use jacobian::{energy_residual, gather_rows, CenteredJacobian, JacobianProvider};
pub use logger::{IterationLog, Logger, NullLogger, RuntimeLog};
pub use srt::SrtDriver;
pub use system::{solve_update, JacobianOperator, LinearSystemPath, NtkImplementation, Regularization};
pub use vmc::{Preconditioner, Vmc};
