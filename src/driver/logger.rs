//! Per-iteration observables collected by the drivers.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sampling::EnergyStats;

/// Quantities recorded after every iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationLog {
    pub step: usize,
    #[serde(rename = "Energy")]
    pub energy: EnergyStats,
    pub diag_shift: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proj_reg: Option<f64>,
    /// Norm of the update handed to the optimizer
    pub update_norm: f64,
}

pub trait Logger {
    fn log(&mut self, entry: &IterationLog);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&mut self, _entry: &IterationLog) {}
}

/// In-memory history, dumpable as YAML.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct RuntimeLog {
    pub entries: Vec<IterationLog>,
}

impl RuntimeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Mean energy (real part) per iteration.
    pub fn energies(&self) -> Vec<f64> {
        self.entries.iter().map(|e| e.energy.mean.re).collect()
    }

    pub fn last(&self) -> Option<&IterationLog> {
        self.entries.last()
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn write_yaml<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(self.to_yaml()?.as_bytes())?;
        Ok(())
    }
}

impl Logger for RuntimeLog {
    fn log(&mut self, entry: &IterationLog) {
        self.entries.push(entry.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use num_complex::Complex64;

    #[test]
    fn test_runtime_log_yaml() {
        let mut log = RuntimeLog::new();
        let stats = EnergyStats {
            mean: Complex64::new(-1.5, 0.0),
            variance: 0.25,
            error_of_mean: 0.01,
            tau_corr: 0.0,
            n_samples: 64,
        };
        log.log(&IterationLog { step: 0, energy: stats, diag_shift: 0.1, proj_reg: None, update_norm: 1.0 });
        assert_eq!(log.energies(), vec![-1.5]);
        let yaml = log.to_yaml().unwrap();
        assert!(yaml.contains("Energy"));
        assert!(!yaml.contains("proj_reg"));
        let back: RuntimeLog = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.entries, log.entries);
    }
}
