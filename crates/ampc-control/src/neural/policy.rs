use std::sync::Arc;

use ampc_core::{Bounds, ControlError, Input, State, VarClass};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::Network;
use crate::{policy::check_bounds, BoundedPolicy};

/// Affine map of one variable class onto `[0, 1]`.
///
/// Components with an infinite bound are passed through unchanged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MinMax {
    pub offset: Vec<f64>,
    pub scale: Vec<f64>,
}

impl MinMax {
    pub fn from_bounds(bounds: &Bounds, class: VarClass) -> Self {
        let (offset, scale): (Vec<f64>, Vec<f64>) = bounds
            .lower(class)
            .iter()
            .zip(bounds.upper(class))
            .map(|(lo, hi)| {
                if lo.is_finite() && hi.is_finite() && hi > lo {
                    (*lo, hi - lo)
                } else {
                    (0.0, 1.0)
                }
            })
            .unzip();
        Self { offset, scale }
    }

    pub fn len(&self) -> usize {
        self.offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offset.is_empty()
    }

    /// Checks that the map covers `n` components with finite, non-zero scales.
    pub fn validate(&self, n: usize, what: &str) -> Result<(), ControlError> {
        if self.offset.len() != n || self.scale.len() != n {
            return Err(ControlError::config(format!(
                "{} scaling has {} offsets and {} scales, expected {}",
                what,
                self.offset.len(),
                self.scale.len(),
                n
            )));
        }
        let finite = self.offset.iter().all(|v| v.is_finite())
            && self.scale.iter().all(|s| s.is_finite() && *s != 0.0);
        if !finite {
            return Err(ControlError::config(format!(
                "{} scaling must be finite with non-zero scales",
                what
            )));
        }
        Ok(())
    }

    pub fn scale(&self, values: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            values.len(),
            values
                .iter()
                .zip(self.offset.iter().zip(self.scale.iter()))
                .map(|(v, (o, s))| (v - o) / s),
        )
    }

    pub fn unscale(&self, values: &DVector<f64>) -> DVector<f64> {
        DVector::from_iterator(
            values.len(),
            values
                .iter()
                .zip(self.offset.iter().zip(self.scale.iter()))
                .map(|(v, (o, s))| v * s + o),
        )
    }
}

/// Scaling of network inputs (states) and outputs (control inputs).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaling {
    pub state: MinMax,
    pub input: MinMax,
}

impl Scaling {
    pub fn from_bounds(bounds: &Bounds) -> Self {
        Self {
            state: MinMax::from_bounds(bounds, VarClass::State),
            input: MinMax::from_bounds(bounds, VarClass::Input),
        }
    }
}

/// Everything needed to rebuild an [`ApproxPolicy`], stored as JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApproxParameters {
    pub state_names: Vec<String>,
    pub input_names: Vec<String>,
    pub scaling: Scaling,
    pub network: Network,
}

/// Approximate MPC: a trained network standing in for the optimization.
pub struct ApproxPolicy {
    bounds: Arc<Bounds>,
    parameters: ApproxParameters,
}

impl ApproxPolicy {
    pub fn new(parameters: ApproxParameters, bounds: Arc<Bounds>) -> Result<Self, ControlError> {
        let vars = bounds.variables();
        if parameters.state_names != vars.state_names()
            || parameters.input_names != vars.input_names()
        {
            return Err(ControlError::config(format!(
                "network was trained for states {:?} and inputs {:?}",
                parameters.state_names, parameters.input_names
            )));
        }
        let n_states = parameters.network.n_inputs();
        let n_inputs = parameters.network.n_outputs();
        check_bounds(&bounds, n_states, n_inputs)?;
        parameters.scaling.state.validate(n_states, "state")?;
        parameters.scaling.input.validate(n_inputs, "input")?;
        Ok(Self { bounds, parameters })
    }

    pub fn parameters(&self) -> &ApproxParameters {
        &self.parameters
    }

    pub fn into_parameters(self) -> ApproxParameters {
        self.parameters
    }
}

impl BoundedPolicy for ApproxPolicy {
    fn dimensions(&self) -> (usize, usize) {
        (
            self.parameters.network.n_inputs(),
            self.parameters.network.n_outputs(),
        )
    }

    fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    fn compute(&mut self, state: &State) -> Result<Input, ControlError> {
        let scaled = self.parameters.scaling.state.scale(state);
        let output = self.parameters.network.forward(&scaled);
        let input = self.parameters.scaling.input.unscale(&output);
        if input.iter().any(|v| !v.is_finite()) {
            return Err(ControlError::Model(format!(
                "network produced a non-finite input {:?}",
                input.as_slice()
            )));
        }
        Ok(input)
    }
}
