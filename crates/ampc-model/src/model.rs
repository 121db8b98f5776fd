use std::{collections::BTreeMap, sync::Arc};

use ampc_core::{check_dimension, ControlError, Input, State, Variables};
use serde::{Deserialize, Serialize};

/// Whether [`Model::rhs`] returns a derivative or a successor state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// `rhs(x, u) = dx/dt`.
    Continuous,
    /// `rhs(x, u) = x_next`.
    Discrete,
}

/// A plant model evaluated numerically.
///
/// Implementations may assume that `state` and `input` have the dimensions declared by
/// [`Model::variables`]; use [`derivative`] or [`next_state`] for checked evaluation.
pub trait Model {
    fn kind(&self) -> ModelKind;

    fn variables(&self) -> &Variables;

    fn rhs(&self, state: &State, input: &Input) -> State;

    /// `(n_states, n_inputs)`.
    fn dimensions(&self) -> (usize, usize) {
        let vars = self.variables();
        (vars.n_states(), vars.n_inputs())
    }

    /// A copy of the model with the named uncertain parameters set to `parameters`.
    ///
    /// Parameters that are not named keep their current value. Models without uncertain
    /// parameters reject every name.
    fn with_parameters(&self, parameters: &BTreeMap<String, f64>) -> Result<Self, ControlError>
    where
        Self: Sized,
    {
        match parameters.keys().next() {
            Some(name) => Err(ControlError::config(format!(
                "model has no uncertain parameter {:?}",
                name
            ))),
            None => Err(ControlError::config("model has no uncertain parameters")),
        }
    }
}

impl<M: Model + ?Sized> Model for Arc<M> {
    fn kind(&self) -> ModelKind {
        (**self).kind()
    }

    fn variables(&self) -> &Variables {
        (**self).variables()
    }

    fn rhs(&self, state: &State, input: &Input) -> State {
        (**self).rhs(state, input)
    }
}

impl<M: Model + ?Sized> Model for Box<M> {
    fn kind(&self) -> ModelKind {
        (**self).kind()
    }

    fn variables(&self) -> &Variables {
        (**self).variables()
    }

    fn rhs(&self, state: &State, input: &Input) -> State {
        (**self).rhs(state, input)
    }
}

pub fn check_model_dimensions<M: Model + ?Sized>(
    model: &M,
    state: &State,
    input: &Input,
) -> Result<(), ControlError> {
    let (n_x, n_u) = model.dimensions();
    check_dimension("model state", state, n_x)?;
    check_dimension("model input", input, n_u)
}

/// State derivative of a continuous-time model.
pub fn derivative<M: Model + ?Sized>(
    model: &M,
    state: &State,
    input: &Input,
) -> Result<State, ControlError> {
    if model.kind() != ModelKind::Continuous {
        return Err(ControlError::Model(
            "derivative requested from a discrete model".into(),
        ));
    }
    check_model_dimensions(model, state, input)?;
    Ok(model.rhs(state, input))
}

/// Successor state of a discrete-time model.
pub fn next_state<M: Model + ?Sized>(
    model: &M,
    state: &State,
    input: &Input,
) -> Result<State, ControlError> {
    if model.kind() != ModelKind::Discrete {
        return Err(ControlError::Model(
            "next state requested from a continuous model, integrate it instead".into(),
        ));
    }
    check_model_dimensions(model, state, input)?;
    Ok(model.rhs(state, input))
}
