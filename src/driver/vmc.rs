//! Classical VMC driver with an optional SR preconditioner.
//!
//! The energy gradient is `F = Jᵀ dv`; SR preconditions it with
//! `S = JᵀJ + λI` in parameter space.

use nalgebra::{DMatrix, DVector};
use tracing::{debug, info};

use crate::distributed::DistributedContext;
use crate::error::{NqsError, Result};
use crate::models::Model;
use crate::operator::DiscreteOperator;
use crate::optimizer::{DenseSolver, LinearSolver, Optimizer, Schedule};
use crate::sampling::{EnergyStats, MCState, Sampler};

use super::config::JacobianMode;
use super::jacobian::{energy_residual, gather_rows, JacobianProvider};
use super::logger::{IterationLog, Logger};
use super::srt::{estimate, resolve_mode, Estimate};
use super::system::NtkImplementation;

/// Gradient transformation applied before the optimizer.
#[derive(Debug, Clone)]
pub enum Preconditioner {
    /// Plain energy gradient.
    Identity,
    /// Stochastic reconfiguration, `(JᵀJ + diag_shift·I)⁻¹ F`.
    Sr { diag_shift: Schedule, solver: DenseSolver },
}

impl Preconditioner {
    pub fn sr(diag_shift: impl Into<Schedule>) -> Self {
        Preconditioner::Sr { diag_shift: diag_shift.into(), solver: DenseSolver::Cholesky }
    }

    fn apply(&self, jac: &DMatrix<f64>, grad: DVector<f64>, step: usize) -> Result<(DVector<f64>, f64)> {
        match self {
            Preconditioner::Identity => Ok((grad, 0.0)),
            Preconditioner::Sr { diag_shift, solver } => {
                let shift = diag_shift.value(step);
                let mut s = jac.tr_mul(jac);
                for i in 0..s.nrows() {
                    s[(i, i)] += shift;
                }
                Ok((solver.solve(&s, &grad)?, shift))
            }
        }
    }
}

/// Variational Monte Carlo in parameter space.
pub struct Vmc<O, M, S, Opt>
where
    M: Model,
    S: Sampler,
    Opt: Optimizer,
{
    hamiltonian: O,
    optimizer: Opt,
    optimizer_state: Opt::State,
    state: MCState<M, S>,
    preconditioner: Preconditioner,
    ctx: DistributedContext,
    mode: JacobianMode,
    chunk_size: Option<usize>,
    step_count: usize,
    energy: Option<EnergyStats>,
}

impl<O, M, S, Opt> Vmc<O, M, S, Opt>
where
    O: DiscreteOperator,
    M: Model,
    S: Sampler,
    Opt: Optimizer,
{
    pub fn new(hamiltonian: O, optimizer: Opt, state: MCState<M, S>, preconditioner: Preconditioner) -> Result<Self> {
        Self::new_distributed(hamiltonian, optimizer, state, preconditioner, DistributedContext::local())
    }

    pub fn new_distributed(
        hamiltonian: O,
        optimizer: Opt,
        state: MCState<M, S>,
        preconditioner: Preconditioner,
        ctx: DistributedContext,
    ) -> Result<Self> {
        let mode = resolve_mode(None, &state)?;
        let optimizer_state = optimizer.init(state.parameters().n_real_coords());
        Ok(Self {
            hamiltonian,
            optimizer,
            optimizer_state,
            state,
            preconditioner,
            ctx,
            mode,
            chunk_size: None,
            step_count: 0,
            energy: None,
        })
    }

    /// Override the auto-selected Jacobian mode.
    pub fn with_jacobian_mode(mut self, mode: &str) -> Result<Self> {
        self.mode = resolve_mode(Some(mode.parse()?), &self.state)?;
        Ok(self)
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size.max(1));
        self
    }

    pub fn jacobian_mode(&self) -> JacobianMode {
        self.mode
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn state(&self) -> &MCState<M, S> {
        &self.state
    }

    pub fn energy(&self) -> Option<&EnergyStats> {
        self.energy.as_ref()
    }

    pub fn run(&mut self, n_iter: usize, logger: &mut dyn Logger) -> Result<()> {
        info!(n_iter, mode = %self.mode, preconditioner = ?self.preconditioner, "starting VMC optimization");
        for _ in 0..n_iter {
            let entry = self.step()?;
            logger.log(&entry);
        }
        Ok(())
    }

    pub fn step(&mut self) -> Result<IterationLog> {
        let step = self.step_count;
        let Estimate { stats, e_loc, n_total } = estimate(&mut self.state, &self.hamiltonian, &self.ctx)?;
        let dv_local = energy_residual(&e_loc, stats.mean, self.mode, n_total);
        let dv = DVector::from_vec(self.ctx.all_gather(dv_local.as_slice())?);

        let samples = self
            .state
            .samples()
            .ok_or_else(|| NqsError::InvalidConfiguration("sampler returned no batch".to_string()))?;
        let provider = JacobianProvider::new(&self.state.model, self.state.parameters(), self.mode, self.chunk_size);
        let mean = provider.global_mean(samples, n_total, &self.ctx)?;
        let local = provider
            .centered(samples, mean, n_total, NtkImplementation::default())
            .to_dense();
        let jac = gather_rows(&local, &self.ctx)?;

        let grad = jac.tr_mul(&dv);
        let (update, diag_shift) = self.preconditioner.apply(&jac, grad, step)?;

        let (delta, optimizer_state) = self.optimizer.update(&update, self.optimizer_state.clone());
        self.optimizer_state = optimizer_state;
        let params = self.state.parameters_mut();
        params.add_real_coords(&delta);
        if !params.is_finite() {
            return Err(NqsError::NumericalInstability(format!(
                "parameters became non-finite at step {step}"
            )));
        }

        debug!(step, energy = stats.mean.re, error = stats.error_of_mean, "VMC iteration");
        self.step_count += 1;
        self.energy = Some(stats);
        Ok(IterationLog {
            step,
            energy: stats,
            diag_shift,
            proj_reg: None,
            update_norm: update.norm(),
        })
    }
}
