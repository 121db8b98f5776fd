use ampc_core::{check_state, ControlError, Observation, State};

/// Turns plant observations into the state estimate the controller acts on.
pub trait Estimator {
    fn set_initial_state(&mut self, state: &State) -> Result<(), ControlError>;

    fn step(&mut self, observation: &Observation) -> Result<State, ControlError>;
}

impl<E: Estimator + ?Sized> Estimator for Box<E> {
    fn set_initial_state(&mut self, state: &State) -> Result<(), ControlError> {
        (**self).set_initial_state(state)
    }

    fn step(&mut self, observation: &Observation) -> Result<State, ControlError> {
        (**self).step(observation)
    }
}

impl<E: Estimator + ?Sized> Estimator for &mut E {
    fn set_initial_state(&mut self, state: &State) -> Result<(), ControlError> {
        (**self).set_initial_state(state)
    }

    fn step(&mut self, observation: &Observation) -> Result<State, ControlError> {
        (**self).step(observation)
    }
}

/// Full state feedback: the observation is the estimate.
///
/// Keeps its own copy of the latest estimate, independent of the plant's true state.
#[derive(Clone, Debug)]
pub struct StateFeedback {
    n_states: usize,
    estimate: Option<State>,
}

impl StateFeedback {
    pub fn new(n_states: usize) -> Self {
        Self {
            n_states,
            estimate: None,
        }
    }

    pub fn estimate(&self) -> Option<&State> {
        self.estimate.as_ref()
    }
}

impl Estimator for StateFeedback {
    fn set_initial_state(&mut self, state: &State) -> Result<(), ControlError> {
        check_state(state, self.n_states)?;
        self.estimate = Some(state.clone());
        Ok(())
    }

    fn step(&mut self, observation: &Observation) -> Result<State, ControlError> {
        check_state(observation, self.n_states)?;
        self.estimate = Some(observation.clone());
        Ok(observation.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity() {
        let mut estimator = StateFeedback::new(2);
        let y = Observation::from_vec(vec![1.0, 2.0]);
        assert_eq!(estimator.step(&y).unwrap(), y);
        assert_eq!(estimator.estimate(), Some(&y));
    }

    #[test]
    fn test_wrong_dimension() {
        let mut estimator = StateFeedback::new(4);
        assert!(matches!(
            estimator.step(&Observation::from_vec(vec![1.0, 2.0, 3.0])),
            Err(ControlError::DimensionMismatch {
                expected: 4,
                actual: 3,
                ..
            })
        ));
    }

    #[test]
    fn test_non_finite_observation() {
        let mut estimator = StateFeedback::new(1);
        assert!(matches!(
            estimator.step(&Observation::from_vec(vec![f64::NAN])),
            Err(ControlError::InvalidState(_))
        ));
    }
}
