use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rust_nqs::{
    read_run_config, DenseRbm, DistributedContext, Ising, MCState, MetropolisSampler, Model, ModelKind,
    ParamDtype, Rbm, RbmModPhase, RunConfig, RuntimeLog, Sgd, SpinHilbert, SquareLattice, SrtDriver,
};

#[derive(Parser, Debug)]
#[command(version, about = "SRt optimization of the transverse-field Ising model")]
struct Args {
    /// Run configuration in YAML
    #[arg(short, long, default_value = "config.yml")]
    config: PathBuf,

    /// Write the per-iteration log here as YAML
    #[arg(long)]
    log_out: Option<PathBuf>,
}

fn optimize<M: Model>(cfg: &RunConfig, model: M) -> rust_nqs::Result<RuntimeLog> {
    let lattice = SquareLattice::new(cfg.lattice_length, 1);
    let hilbert = SpinHilbert::new(lattice.n_sites());
    let hamiltonian = Ising::new(hilbert.clone(), &lattice, cfg.field).with_coupling(cfg.coupling);
    let sampler = MetropolisSampler::local(hilbert, cfg.n_chains)?;
    let state = MCState::new(sampler, model, cfg.n_samples, cfg.seed, cfg.sampler_seed)?;
    let optimizer = Sgd::new(cfg.learning_rate.clone());

    let mut driver =
        SrtDriver::new_distributed(hamiltonian, optimizer, state, cfg.driver.clone(), DistributedContext::local())?;
    let mut log = RuntimeLog::new();
    driver.run(cfg.n_iter, &mut log)?;
    Ok(log)
}

fn main() -> rust_nqs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = read_run_config(&args.config)?;
    info!(config = %args.config.display(), "loaded run configuration");

    let log = match cfg.model {
        ModelKind::Rbm { alpha, complex } => {
            let dtype = if complex { ParamDtype::Complex } else { ParamDtype::Real };
            optimize(&cfg, Rbm::new().with_alpha(alpha).with_param_dtype(dtype))?
        }
        ModelKind::RbmModPhase { alpha } => optimize(&cfg, RbmModPhase { alpha, ..RbmModPhase::default() })?,
        ModelKind::DenseRbm { n_hidden, complex_phase } => optimize(&cfg, DenseRbm::new(n_hidden, complex_phase))?,
    };

    let n_sites = cfg.lattice_length * cfg.lattice_length;
    println!("SRt optimization of the {0}x{0} transverse-field Ising model", cfg.lattice_length);
    println!("------------------------------------------------------");
    println!("Iterations: {}", log.len());
    if let Some(last) = log.last() {
        println!("Final energy: {}", last.energy);
        println!("Energy per site: {:.6}", last.energy.mean.re / n_sites as f64);
    }

    if let Some(path) = &args.log_out {
        log.write_yaml(path)?;
        info!(path = %path.display(), "wrote runtime log");
    }
    Ok(())
}
