//! Models module - variational wavefunctions and their parameter trees.

mod params;
mod rbm;
mod traits;

pub use params::{GradientBuffer, LeafLayout, ParamDtype, ParameterTree, Tensor, TensorData};
pub use rbm::{log_cosh, DenseRbm, Rbm, RbmModPhase};
pub use traits::Model;
