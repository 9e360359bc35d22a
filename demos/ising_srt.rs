//! SRt ground-state search for the 2D transverse-field Ising model.
//!
//! Usage:
//!   cargo run --example ising_srt --release -- [OPTIONS]
//!
//! Options:
//!   -l, --length <N>     Linear lattice size [default: 4]
//!   -n, --iters <N>      Optimization steps [default: 100]
//!   -s, --samples <N>    Samples per step [default: 1024]
//!   --kernel             Solve through the neural tangent kernel
//!   --momentum <F>       SPRING momentum

use clap::Parser;
use rust_nqs::{
    Ising, LinearSystemPath, MCState, MetropolisSampler, NtkImplementation, Rbm, RuntimeLog, Schedule, Sgd,
    SpinHilbert, SquareLattice, SrtConfig, SrtDriver,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "SRt optimization of an RBM for the transverse-field Ising model")]
struct Args {
    #[arg(short, long, default_value_t = 4)]
    length: usize,

    #[arg(short = 'n', long, default_value_t = 100)]
    iters: usize,

    #[arg(short, long, default_value_t = 1024)]
    samples: usize,

    /// Transverse field
    #[arg(long, default_value_t = 3.0)]
    field: f64,

    #[arg(long)]
    kernel: bool,

    #[arg(long)]
    momentum: Option<f64>,
}

fn main() -> rust_nqs::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();
    let args = Args::parse();

    let lattice = SquareLattice::new(args.length, 1);
    let hilbert = SpinHilbert::new(lattice.n_sites());
    let hamiltonian = Ising::new(hilbert.clone(), &lattice, args.field);
    let sampler = MetropolisSampler::local(hilbert, 16)?;
    let state = MCState::new(sampler, Rbm::new().with_alpha(2), args.samples, 1234, 5678)?;

    let mut config = SrtConfig::new()
        .with_diag_shift(Schedule::linear(0.1, 1e-3, args.iters))
        .with_chunk_size(256);
    if args.kernel {
        config = config.with_path(LinearSystemPath::Kernel(NtkImplementation::VectorProducts));
    }
    if let Some(m) = args.momentum {
        config = config.with_momentum(m);
    }

    println!("TFIM {0}x{0}, h = {1}", args.length, args.field);
    println!("===============================");

    let mut driver = SrtDriver::new(hamiltonian, Sgd::new(0.01), state, config)?;
    let mut log = RuntimeLog::new();
    for block in 0..args.iters.div_ceil(10) {
        let n = 10.min(args.iters - block * 10);
        driver.run(n, &mut log)?;
        if let Some(energy) = driver.energy() {
            println!("step {:>4}  {}", driver.step_count(), energy);
        }
    }

    if let Some(last) = log.last() {
        let n_sites = (args.length * args.length) as f64;
        println!();
        println!("Energy per site: {:.6}", last.energy.mean.re / n_sites);
    }
    Ok(())
}
