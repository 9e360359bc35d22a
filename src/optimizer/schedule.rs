//! Step-indexed scalar schedules for learning rates and regularizers.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A scalar that may change with the optimization step.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Schedule {
    Constant(f64),
    /// Linear interpolation from `init` to `end`, then held at `end`.
    Linear {
        init: f64,
        end: f64,
        transition_steps: usize,
    },
    /// `init · decay_rate^(step / transition_steps)`.
    Exponential {
        init: f64,
        decay_rate: f64,
        transition_steps: usize,
    },
    #[serde(skip)]
    Custom(Arc<dyn Fn(usize) -> f64 + Send + Sync>),
}

impl fmt::Debug for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Constant(c) => f.debug_tuple("Constant").field(c).finish(),
            Schedule::Linear { init, end, transition_steps } => f
                .debug_struct("Linear")
                .field("init", init)
                .field("end", end)
                .field("transition_steps", transition_steps)
                .finish(),
            Schedule::Exponential { init, decay_rate, transition_steps } => f
                .debug_struct("Exponential")
                .field("init", init)
                .field("decay_rate", decay_rate)
                .field("transition_steps", transition_steps)
                .finish(),
            Schedule::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<f64> for Schedule {
    fn from(value: f64) -> Self {
        Schedule::Constant(value)
    }
}

impl Schedule {
    pub fn linear(init: f64, end: f64, transition_steps: usize) -> Self {
        Schedule::Linear { init, end, transition_steps }
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(usize) -> f64 + Send + Sync + 'static,
    {
        Schedule::Custom(Arc::new(f))
    }

    pub fn value(&self, step: usize) -> f64 {
        match self {
            Schedule::Constant(c) => *c,
            Schedule::Linear { init, end, transition_steps } => {
                if *transition_steps == 0 || step >= *transition_steps {
                    *end
                } else {
                    let frac = step as f64 / *transition_steps as f64;
                    init + (end - init) * frac
                }
            }
            Schedule::Exponential { init, decay_rate, transition_steps } => {
                let steps = (*transition_steps).max(1) as f64;
                init * decay_rate.powf(step as f64 / steps)
            }
            Schedule::Custom(f) => f(step),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_linear_schedule() {
        let s = Schedule::linear(0.1, 0.001, 100);
        assert_relative_eq!(s.value(0), 0.1);
        assert_relative_eq!(s.value(50), 0.0505);
        assert_relative_eq!(s.value(100), 0.001);
        assert_relative_eq!(s.value(1000), 0.001);
    }

    #[test]
    fn test_exponential_and_custom() {
        let s = Schedule::Exponential { init: 1.0, decay_rate: 0.5, transition_steps: 2 };
        assert_relative_eq!(s.value(4), 0.25);
        let c = Schedule::custom(|step| step as f64 * 2.0);
        assert_relative_eq!(c.value(3), 6.0);
        assert_eq!(format!("{c:?}"), "Custom(..)");
    }

    #[test]
    fn test_schedule_yaml() {
        let s: Schedule = serde_yaml::from_str("!linear {init: 0.1, end: 0.001, transition_steps: 100}").unwrap();
        assert_relative_eq!(s.value(100), 0.001);
        let c: Schedule = serde_yaml::from_str("!constant 0.01").unwrap();
        assert_relative_eq!(c.value(7), 0.01);
    }
}
