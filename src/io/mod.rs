//! IO module - run configuration files.

mod config;

pub use config::{parse_run_config, read_run_config, ModelKind, RunConfig};
