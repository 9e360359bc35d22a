//! Driver configuration and Jacobian mode resolution.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{NqsError, Result};
use crate::models::ParamDtype;
use crate::optimizer::{DenseSolver, Schedule};

use super::system::LinearSystemPath;

/// How complex log-derivatives are turned into real Jacobian rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JacobianMode {
    /// One row per sample: `Re O(x)`.
    Real,
    /// Two rows per sample: `Re O(x)` and `Im O(x)`.
    Complex,
    /// Two rows per sample, built from the complex derivative of a
    /// holomorphic model.
    Holomorphic,
}

impl FromStr for JacobianMode {
    type Err = NqsError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "real" => Ok(JacobianMode::Real),
            "complex" => Ok(JacobianMode::Complex),
            "holomorphic" => Ok(JacobianMode::Holomorphic),
            other => Err(NqsError::InvalidConfiguration(format!(
                "unknown jacobian_mode {other:?}; expected \"real\", \"complex\" or \"holomorphic\""
            ))),
        }
    }
}

impl fmt::Display for JacobianMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JacobianMode::Real => "real",
            JacobianMode::Complex => "complex",
            JacobianMode::Holomorphic => "holomorphic",
        };
        f.write_str(name)
    }
}

impl JacobianMode {
    /// Pick or validate the mode from what the model declares about itself.
    pub fn resolve(
        requested: Option<JacobianMode>,
        dtype: ParamDtype,
        real_output: bool,
        holomorphic: bool,
    ) -> Result<JacobianMode> {
        match requested {
            None => Ok(match dtype {
                ParamDtype::Real if real_output => JacobianMode::Real,
                _ => JacobianMode::Complex,
            }),
            Some(JacobianMode::Real) => {
                if dtype != ParamDtype::Real {
                    Err(NqsError::InvalidConfiguration(
                        "jacobian_mode \"real\" requires real parameters".to_string(),
                    ))
                } else if !real_output {
                    Err(NqsError::InvalidConfiguration(
                        "jacobian_mode \"real\" requires a real-valued model output".to_string(),
                    ))
                } else {
                    Ok(JacobianMode::Real)
                }
            }
            Some(JacobianMode::Complex) => Ok(JacobianMode::Complex),
            Some(JacobianMode::Holomorphic) => {
                if dtype != ParamDtype::Complex || !holomorphic {
                    Err(NqsError::InvalidConfiguration(
                        "jacobian_mode \"holomorphic\" requires complex parameters and a holomorphic model"
                            .to_string(),
                    ))
                } else {
                    Ok(JacobianMode::Holomorphic)
                }
            }
        }
    }

    pub fn rows_per_sample(self) -> usize {
        match self {
            JacobianMode::Real => 1,
            JacobianMode::Complex | JacobianMode::Holomorphic => 2,
        }
    }
}

/// Settings shared by the SRt and SR drivers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SrtConfig {
    /// Diagonal regularization of the linear system
    pub diag_shift: Schedule,
    /// `"real"`, `"complex"`, `"holomorphic"`, or unset for auto-selection
    pub jacobian_mode: Option<String>,
    /// Weight of the `11ᵀ` projector added to the sample-space system
    pub proj_reg: Option<Schedule>,
    /// Momentum in `[0, 1)`
    pub momentum: Option<f64>,
    /// Samples per Jacobian chunk
    pub chunk_size: Option<usize>,
    pub linear_solver: DenseSolver,
    pub path: LinearSystemPath,
}

impl Default for SrtConfig {
    fn default() -> Self {
        Self {
            diag_shift: Schedule::Constant(0.01),
            jacobian_mode: None,
            proj_reg: None,
            momentum: None,
            chunk_size: None,
            linear_solver: DenseSolver::Cholesky,
            path: LinearSystemPath::Jacobian,
        }
    }
}

impl SrtConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_diag_shift(mut self, diag_shift: impl Into<Schedule>) -> Self {
        self.diag_shift = diag_shift.into();
        self
    }

    pub fn with_jacobian_mode(mut self, mode: &str) -> Self {
        self.jacobian_mode = Some(mode.to_string());
        self
    }

    pub fn with_proj_reg(mut self, proj_reg: impl Into<Schedule>) -> Self {
        self.proj_reg = Some(proj_reg.into());
        self
    }

    pub fn with_momentum(mut self, momentum: f64) -> Self {
        self.momentum = Some(momentum);
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = Some(chunk_size);
        self
    }

    pub fn with_linear_solver(mut self, solver: DenseSolver) -> Self {
        self.linear_solver = solver;
        self
    }

    pub fn with_path(mut self, path: LinearSystemPath) -> Self {
        self.path = path;
        self
    }

    /// Checks that do not depend on the model.
    pub(crate) fn validate(&self) -> Result<Option<JacobianMode>> {
        let requested = self
            .jacobian_mode
            .as_deref()
            .map(JacobianMode::from_str)
            .transpose()?;
        let shift = self.diag_shift.value(0);
        if !shift.is_finite() || shift < 0.0 {
            return Err(NqsError::InvalidConfiguration(format!(
                "diag_shift must be finite and non-negative, got {shift}"
            )));
        }
        if let Some(m) = self.momentum {
            if !(0.0..1.0).contains(&m) {
                return Err(NqsError::InvalidConfiguration(format!(
                    "momentum must lie in [0, 1), got {m}"
                )));
            }
        }
        if self.chunk_size == Some(0) {
            return Err(NqsError::InvalidConfiguration(
                "chunk_size must be positive".to_string(),
            ));
        }
        Ok(requested)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mode_is_rejected() {
        let err = "imaginary".parse::<JacobianMode>().unwrap_err();
        assert!(matches!(err, NqsError::InvalidConfiguration(_)));
        assert!(SrtConfig::new().with_jacobian_mode("Real").validate().is_err());
    }

    #[test]
    fn test_auto_resolution() {
        use JacobianMode::*;
        assert_eq!(JacobianMode::resolve(None, ParamDtype::Complex, false, true).unwrap(), Complex);
        assert_eq!(JacobianMode::resolve(None, ParamDtype::Mixed, true, false).unwrap(), Complex);
        assert_eq!(JacobianMode::resolve(None, ParamDtype::Real, true, false).unwrap(), Real);
        assert_eq!(JacobianMode::resolve(None, ParamDtype::Real, false, false).unwrap(), Complex);
    }

    #[test]
    fn test_inconsistent_modes() {
        use JacobianMode::*;
        assert!(JacobianMode::resolve(Some(Real), ParamDtype::Complex, true, true).is_err());
        assert!(JacobianMode::resolve(Some(Real), ParamDtype::Real, false, false).is_err());
        assert!(JacobianMode::resolve(Some(Holomorphic), ParamDtype::Real, true, false).is_err());
        assert!(JacobianMode::resolve(Some(Holomorphic), ParamDtype::Complex, false, false).is_err());
        assert_eq!(
            JacobianMode::resolve(Some(Holomorphic), ParamDtype::Complex, false, true).unwrap(),
            Holomorphic
        );
    }

    #[test]
    fn test_option_validation() {
        assert!(SrtConfig::new().with_momentum(1.0).validate().is_err());
        assert!(SrtConfig::new().with_chunk_size(0).validate().is_err());
        assert!(SrtConfig::new().with_diag_shift(-0.1).validate().is_err());
        assert!(SrtConfig::new().with_momentum(0.9).validate().is_ok());
    }
}
