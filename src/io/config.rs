//! YAML run configuration for the command-line driver.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::driver::SrtConfig;
use crate::error::Result;
use crate::optimizer::Schedule;

/// Variational model selected in a run file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Rbm { alpha: usize, complex: bool },
    RbmModPhase { alpha: usize },
    DenseRbm { n_hidden: usize, complex_phase: bool },
}

/// Transverse-field Ising optimization on a periodic square lattice.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Linear size of the square lattice
    pub lattice_length: usize,
    /// Transverse field `h`
    pub field: f64,
    /// Nearest-neighbour coupling `J`
    pub coupling: f64,
    pub model: ModelKind,
    pub n_chains: usize,
    /// Samples per iteration (per process)
    pub n_samples: usize,
    pub seed: u64,
    pub sampler_seed: u64,
    pub learning_rate: Schedule,
    pub n_iter: usize,
    pub driver: SrtConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            lattice_length: 3,
            field: 1.0,
            coupling: 1.0,
            model: ModelKind::Rbm { alpha: 1, complex: false },
            n_chains: 8,
            n_samples: 512,
            seed: 0,
            sampler_seed: 1,
            learning_rate: Schedule::Constant(0.035),
            n_iter: 50,
            driver: SrtConfig::default(),
        }
    }
}

pub fn read_run_config<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let config: RunConfig = serde_yaml::from_reader(reader)?;
    Ok(config)
}

pub fn parse_run_config(text: &str) -> Result<RunConfig> {
    Ok(serde_yaml::from_str(text)?)
}

// example of yaml file
// lattice_length: 3
// field: 1.0
// model: !rbm {alpha: 1, complex: false}
// n_samples: 1024
// learning_rate: !constant 0.02
// driver:
//   diag_shift: !linear {init: 0.1, end: 0.001, transition_steps: 100}
//   momentum: 0.9
//   chunk_size: 128
//   path: !kernel vector_products

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{LinearSystemPath, NtkImplementation};

    #[test]
    fn test_parse_run_config() {
        let text = "\
lattice_length: 4
model: !dense_rbm {n_hidden: 8, complex_phase: true}
learning_rate: !constant 0.02
driver:
  jacobian_mode: complex
  momentum: 0.9
  chunk_size: 16
  path: !kernel vector_products
";
        let cfg = parse_run_config(text).unwrap();
        assert_eq!(cfg.lattice_length, 4);
        assert_eq!(cfg.n_samples, 512);
        assert_eq!(cfg.model, ModelKind::DenseRbm { n_hidden: 8, complex_phase: true });
        assert_eq!(cfg.driver.momentum, Some(0.9));
        assert_eq!(cfg.driver.jacobian_mode.as_deref(), Some("complex"));
        assert_eq!(cfg.driver.path, LinearSystemPath::Kernel(NtkImplementation::VectorProducts));
    }
}
