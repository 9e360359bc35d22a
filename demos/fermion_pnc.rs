//! Spinful Hubbard chain written three ways: as a generic fermion operator,
//! as a particle-number-conserving operator and as its spin-sector variant.
//! All three must share a spectrum.
//!
//! Usage:
//!   cargo run --example fermion_pnc --release -- [OPTIONS]

use std::collections::BTreeMap;

use clap::Parser;
use nalgebra::SymmetricEigen;
use rust_nqs::{
    DiscreteOperator, FermionOperator2nd, ParticleNumberConservingFermioperator2nd,
    ParticleNumberConservingFermioperator2ndSpin, SparseCoefficients, SpinOrbitalFermions,
};

#[derive(Parser, Debug)]
#[command(version, about = "Hubbard chain through the PNC fermion operators")]
struct Args {
    /// Number of sites
    #[arg(short = 'L', long, default_value_t = 4)]
    sites: usize,

    #[arg(short = 't', long, default_value_t = 1.0)]
    hopping: f64,

    #[arg(short = 'U', long, default_value_t = 4.0)]
    interaction: f64,

    /// Electrons per spin sector
    #[arg(short = 'n', long, default_value_t = 2)]
    filling: usize,
}

fn ground_energy<O: DiscreteOperator>(op: &O) -> rust_nqs::Result<f64> {
    Ok(SymmetricEigen::new(op.to_dense()?).eigenvalues.min())
}

fn main() -> rust_nqs::Result<()> {
    let args = Args::parse();
    let l = args.sites;
    let hilbert = SpinOrbitalFermions::with_spin(l, 0.5, vec![args.filling, args.filling])?;

    let mut hop = SparseCoefficients::new(l, 2);
    for i in 0..l {
        let j = (i + 1) % l;
        hop.add(vec![i, j], -args.hopping)?;
        hop.add(vec![j, i], -args.hopping)?;
    }
    // U n_{i↑} n_{i↓} = U c†_{i↑} c†_{i↓} c_{i↓} c_{i↑}
    let mut onsite = SparseCoefficients::new(l, 4);
    for i in 0..l {
        onsite.add(vec![i, i, i, i], args.interaction)?;
    }

    let mut one_body = BTreeMap::new();
    one_body.insert(0, hop.clone());
    one_body.insert(1, hop.clone());
    let mut two_body = BTreeMap::new();
    two_body.insert((0, 1), onsite);
    let spin_op = ParticleNumberConservingFermioperator2ndSpin::from_sparse_arrays(
        hilbert.clone(),
        0.0,
        one_body,
        two_body,
    )?;

    let mut terms = Vec::new();
    let mut weights = Vec::new();
    for s in 0..2 {
        for (idx, v) in hop.iter() {
            terms.push(format!("{}^ {}", hilbert.mode(idx[0], s), hilbert.mode(idx[1], s)));
            weights.push(v);
        }
    }
    for i in 0..l {
        let (up, down) = (hilbert.mode(i, 0), hilbert.mode(i, 1));
        terms.push(format!("{up}^ {down}^ {down} {up}"));
        weights.push(args.interaction);
    }
    let generic = FermionOperator2nd::new(hilbert.clone(), &terms, &weights)?;
    let pnc = ParticleNumberConservingFermioperator2nd::from_fermiop(&generic)?;

    println!("Hubbard chain L = {l}, t = {}, U = {}", args.hopping, args.interaction);
    println!("Hilbert space dimension: {}", hilbert.masks().len());
    println!("-----------------------------------");
    println!("generic operator     ({:>3} terms): {:.10}", generic.n_terms(), ground_energy(&generic)?);
    println!("number conserving    ({:>3} terms): {:.10}", pnc.n_terms(), ground_energy(&pnc)?);
    println!("spin-sector variant            : {:.10}", ground_energy(&spin_op)?);
    Ok(())
}
