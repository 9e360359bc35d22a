//! Optimizer module - update rules, schedules and linear solvers.

mod schedule;
mod sgd;
mod solver;

pub use schedule::Schedule;
pub use sgd::{Optimizer, Sgd, SgdState};
pub use solver::{DenseSolver, LinearSolver};
