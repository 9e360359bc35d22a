//! SRt: stochastic reconfiguration solved in sample space.
//!
//! Each iteration solves `(J Jᵀ + λI + p/n·11ᵀ) a = dv` and updates the
//! parameters along `u = Jᵀ a`, which equals the natural gradient
//! `(JᵀJ + λI)⁻¹ Jᵀ dv` without ever forming the parameter-space matrix.

use nalgebra::DVector;
use num_complex::Complex64;
use tracing::{debug, info};

use crate::distributed::DistributedContext;
use crate::error::{NqsError, Result};
use crate::models::Model;
use crate::operator::DiscreteOperator;
use crate::optimizer::{LinearSolver, Optimizer, Schedule};
use crate::sampling::{EnergyStats, MCState, Sampler, Samples};

use super::config::{JacobianMode, SrtConfig};
use super::jacobian::{energy_residual, gather_rows, JacobianProvider};
use super::logger::{IterationLog, Logger};
use super::system::{solve_update, LinearSystemPath, NtkImplementation, Regularization};

/// One iteration's Monte Carlo estimate on this rank.
pub(crate) struct Estimate {
    pub stats: EnergyStats,
    pub e_loc: Vec<Complex64>,
    pub n_total: usize,
}

/// Check shard sizes, resample and evaluate local energies.
pub(crate) fn estimate<O, M, S>(
    state: &mut MCState<M, S>,
    hamiltonian: &O,
    ctx: &DistributedContext,
) -> Result<Estimate>
where
    O: DiscreteOperator,
    M: Model,
    S: Sampler,
{
    let n_total = ctx.check_shard(state.n_samples())?;
    state.sample();
    let samples = state
        .samples()
        .ok_or_else(|| NqsError::InvalidConfiguration("sampler returned no batch".to_string()))?;
    let e_loc = state.local_energies(hamiltonian, samples);
    let stats = EnergyStats::compute(&e_loc, state.n_chains(), ctx)?;
    if !stats.mean.re.is_finite() {
        return Err(NqsError::NumericalInstability(format!(
            "non-finite energy estimate {}",
            stats.mean
        )));
    }
    Ok(Estimate { stats, e_loc, n_total })
}

pub(crate) fn resolve_mode<M: Model, S: Sampler>(
    requested: Option<JacobianMode>,
    state: &MCState<M, S>,
) -> Result<JacobianMode> {
    JacobianMode::resolve(
        requested,
        state.parameters().dtype(),
        state.model.has_real_output(),
        state.model.is_holomorphic(),
    )
}

/// Natural-gradient driver working in sample space.
pub struct SrtDriver<O, M, S, Opt>
where
    M: Model,
    S: Sampler,
    Opt: Optimizer,
{
    hamiltonian: O,
    optimizer: Opt,
    optimizer_state: Opt::State,
    state: MCState<M, S>,
    ctx: DistributedContext,
    mode: JacobianMode,
    diag_shift: Schedule,
    proj_reg: Option<Schedule>,
    momentum: Option<f64>,
    chunk_size: Option<usize>,
    path: LinearSystemPath,
    solver: Box<dyn LinearSolver>,
    momentum_buffer: DVector<f64>,
    step_count: usize,
    energy: Option<EnergyStats>,
}

impl<O, M, S, Opt> SrtDriver<O, M, S, Opt>
where
    O: DiscreteOperator,
    M: Model,
    S: Sampler,
    Opt: Optimizer,
{
    /// Single-process driver. See `new_distributed`.
    pub fn new(hamiltonian: O, optimizer: Opt, state: MCState<M, S>, config: SrtConfig) -> Result<Self> {
        Self::new_distributed(hamiltonian, optimizer, state, config, DistributedContext::local())
    }

    /// Validate the configuration and resolve the Jacobian mode. Nothing is
    /// sampled here. Every rank must construct its driver with the same
    /// configuration and a context from the same collective group.
    pub fn new_distributed(
        hamiltonian: O,
        optimizer: Opt,
        state: MCState<M, S>,
        config: SrtConfig,
        ctx: DistributedContext,
    ) -> Result<Self> {
        let requested = config.validate()?;
        let mode = resolve_mode(requested, &state)?;
        let n_params = state.parameters().n_real_coords();
        let optimizer_state = optimizer.init(n_params);
        Ok(Self {
            hamiltonian,
            optimizer,
            optimizer_state,
            state,
            ctx,
            mode,
            diag_shift: config.diag_shift,
            proj_reg: config.proj_reg,
            momentum: config.momentum,
            chunk_size: config.chunk_size,
            path: config.path,
            solver: Box::new(config.linear_solver),
            momentum_buffer: DVector::zeros(n_params),
            step_count: 0,
            energy: None,
        })
    }

    /// Replace the configured solver, e.g. with a closure.
    pub fn with_linear_solver<L: LinearSolver + 'static>(mut self, solver: L) -> Self {
        self.solver = Box::new(solver);
        self
    }

    pub fn set_chunk_size(&mut self, chunk_size: Option<usize>) -> Result<()> {
        if chunk_size == Some(0) {
            return Err(NqsError::InvalidConfiguration(
                "chunk_size must be positive".to_string(),
            ));
        }
        self.chunk_size = chunk_size;
        Ok(())
    }

    pub fn chunk_size(&self) -> Option<usize> {
        self.chunk_size
    }

    pub fn jacobian_mode(&self) -> JacobianMode {
        self.mode
    }

    pub fn path(&self) -> LinearSystemPath {
        self.path
    }

    pub fn step_count(&self) -> usize {
        self.step_count
    }

    pub fn state(&self) -> &MCState<M, S> {
        &self.state
    }

    pub fn into_state(self) -> MCState<M, S> {
        self.state
    }

    /// Statistics of the last completed iteration.
    pub fn energy(&self) -> Option<&EnergyStats> {
        self.energy.as_ref()
    }

    pub fn momentum_buffer(&self) -> &DVector<f64> {
        &self.momentum_buffer
    }

    pub fn context(&self) -> &DistributedContext {
        &self.ctx
    }

    /// Run `n_iter` iterations, logging each one. Stops at the first error;
    /// updates applied before it are kept.
    pub fn run(&mut self, n_iter: usize, logger: &mut dyn Logger) -> Result<()> {
        info!(
            n_iter,
            mode = %self.mode,
            path = ?self.path,
            n_params = self.state.parameters().n_real_coords(),
            n_samples = self.state.n_samples(),
            rank = self.ctx.rank(),
            "starting SRt optimization"
        );
        for _ in 0..n_iter {
            let entry = self.step()?;
            logger.log(&entry);
        }
        if let Some(e) = &self.energy {
            info!(steps = self.step_count, energy = %e, "SRt optimization finished");
        }
        Ok(())
    }

    /// One full iteration: sample, solve, update.
    pub fn step(&mut self) -> Result<IterationLog> {
        let step = self.step_count;
        let Estimate { stats, e_loc, n_total } = estimate(&mut self.state, &self.hamiltonian, &self.ctx)?;

        let reg = Regularization {
            diag_shift: self.diag_shift.value(step),
            proj_reg: self.proj_reg.as_ref().map(|p| p.value(step)),
            momentum: self.momentum,
        };
        let dv_local = energy_residual(&e_loc, stats.mean, self.mode, n_total);
        let dv = DVector::from_vec(self.ctx.all_gather(dv_local.as_slice())?);

        let samples = self
            .state
            .samples()
            .ok_or_else(|| NqsError::InvalidConfiguration("sampler returned no batch".to_string()))?;
        let provider = JacobianProvider::new(&self.state.model, self.state.parameters(), self.mode, self.chunk_size);

        let update = match self.path {
            LinearSystemPath::Jacobian => {
                let mean = provider.global_mean(samples, n_total, &self.ctx)?;
                let local = provider
                    .centered(samples, mean, n_total, NtkImplementation::default())
                    .to_dense();
                let jac = gather_rows(&local, &self.ctx)?;
                solve_update(&jac, dv, reg, &mut self.momentum_buffer, self.solver.as_ref())?
            }
            LinearSystemPath::Kernel(implementation) => {
                let data = self.ctx.all_gather(samples.as_slice())?;
                let global = Samples::new(samples.n_sites, samples.n_chains * self.ctx.size(), data);
                let mean = provider.global_mean(&global, n_total, &DistributedContext::local())?;
                let jac = provider.centered(&global, mean, n_total, implementation);
                solve_update(&jac, dv, reg, &mut self.momentum_buffer, self.solver.as_ref())?
            }
        };

        let (delta, optimizer_state) = self.optimizer.update(&update, self.optimizer_state.clone());
        self.optimizer_state = optimizer_state;
        let params = self.state.parameters_mut();
        params.add_real_coords(&delta);
        if !params.is_finite() {
            return Err(NqsError::NumericalInstability(format!(
                "parameters became non-finite at step {step}"
            )));
        }

        debug!(
            step,
            energy = stats.mean.re,
            error = stats.error_of_mean,
            variance = stats.variance,
            diag_shift = reg.diag_shift,
            "SRt iteration"
        );
        self.step_count += 1;
        self.energy = Some(stats);
        Ok(IterationLog {
            step,
            energy: stats,
            diag_shift: reg.diag_shift,
            proj_reg: reg.proj_reg,
            update_norm: update.norm(),
        })
    }
}
