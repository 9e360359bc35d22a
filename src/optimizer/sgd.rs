//! First-order update rules acting on real-coordinate gradients.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::schedule::Schedule;

/// Pure update rule: `(gradient, state) -> (delta, state')`.
///
/// The returned delta is added to the parameters as is.
pub trait Optimizer {
    type State: Clone;

    fn init(&self, n_params: usize) -> Self::State;

    fn update(&self, grad: &DVector<f64>, state: Self::State) -> (DVector<f64>, Self::State);
}

/// Plain gradient descent with a scheduled learning rate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sgd {
    pub learning_rate: Schedule,
}

/// Number of updates performed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SgdState {
    pub count: usize,
}

impl Sgd {
    pub fn new(learning_rate: impl Into<Schedule>) -> Self {
        Self { learning_rate: learning_rate.into() }
    }
}

impl Optimizer for Sgd {
    type State = SgdState;

    fn init(&self, _n_params: usize) -> SgdState {
        SgdState::default()
    }

    fn update(&self, grad: &DVector<f64>, state: SgdState) -> (DVector<f64>, SgdState) {
        let lr = self.learning_rate.value(state.count);
        (grad * -lr, SgdState { count: state.count + 1 })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sgd_follows_schedule() {
        let opt = Sgd::new(Schedule::linear(1.0, 0.0, 2));
        let g = DVector::from_vec(vec![1.0, -2.0]);
        let state = opt.init(2);
        let (d0, state) = opt.update(&g, state);
        let (d1, state) = opt.update(&g, state);
        assert_eq!(d0.as_slice(), &[-1.0, 2.0]);
        assert_eq!(d1.as_slice(), &[-0.5, 1.0]);
        assert_eq!(state.count, 2);
    }
}
