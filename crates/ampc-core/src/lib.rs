mod bounds;
mod error;
mod trajectory;
mod variables;

pub mod settings;

pub use bounds::*;
pub use error::*;
pub use trajectory::*;
pub use variables::*;

use nalgebra::DVector;

/// A state vector, ordered like [`Variables::state_names`].
pub type State = DVector<f64>;
/// A control input vector, ordered like [`Variables::input_names`].
pub type Input = DVector<f64>;
/// What the plant reports back after a step.
pub type Observation = DVector<f64>;

/// Returns an error if `vector` does not have `expected` components.
pub fn check_dimension(
    context: &'static str,
    vector: &DVector<f64>,
    expected: usize,
) -> Result<(), ControlError> {
    if vector.len() != expected {
        return Err(ControlError::DimensionMismatch {
            context,
            expected,
            actual: vector.len(),
        });
    }
    Ok(())
}

/// Checks that `state` has `n_states` components, all of them finite.
pub fn check_state(state: &State, n_states: usize) -> Result<(), ControlError> {
    check_dimension("state", state, n_states)?;
    if let Some(index) = state.iter().position(|v| !v.is_finite()) {
        return Err(ControlError::InvalidState(format!(
            "component {} is {}",
            index, state[index]
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_state_rejects_wrong_length() {
        let state = State::from_vec(vec![0.8, 0.5, 134.14]);
        let err = check_state(&state, 4).unwrap_err();
        assert!(matches!(
            err,
            ControlError::DimensionMismatch {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn check_state_rejects_nan() {
        let state = State::from_vec(vec![0.8, f64::NAN]);
        assert!(matches!(
            check_state(&state, 2),
            Err(ControlError::InvalidState(_))
        ));
    }

    #[test]
    fn check_state_rejects_infinity() {
        let state = State::from_vec(vec![f64::INFINITY, 1.0]);
        assert!(matches!(
            check_state(&state, 2),
            Err(ControlError::InvalidState(_))
        ));
    }
}
