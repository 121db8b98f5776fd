use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ControlError;

/// The class a named variable belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VarClass {
    State,
    Input,
}

impl fmt::Display for VarClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VarClass::State => write!(f, "state"),
            VarClass::Input => write!(f, "input"),
        }
    }
}

/// Ordered names of a model's states and inputs.
///
/// The order fixes the layout of every [`crate::State`] and [`crate::Input`] vector used
/// with the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variables {
    states: Vec<String>,
    inputs: Vec<String>,
}

impl Variables {
    pub fn new<S: Into<String>, I: Into<String>>(
        states: impl IntoIterator<Item = S>,
        inputs: impl IntoIterator<Item = I>,
    ) -> Result<Self, ControlError> {
        let states: Vec<String> = states.into_iter().map(Into::into).collect();
        let inputs: Vec<String> = inputs.into_iter().map(Into::into).collect();
        if states.is_empty() || inputs.is_empty() {
            return Err(ControlError::config(
                "a model needs at least one state and one input",
            ));
        }
        for (i, name) in states.iter().chain(inputs.iter()).enumerate() {
            if states.iter().chain(inputs.iter()).skip(i + 1).any(|n| n == name) {
                return Err(ControlError::config(format!(
                    "variable name {:?} is used twice",
                    name
                )));
            }
        }
        Ok(Self { states, inputs })
    }

    pub fn n_states(&self) -> usize {
        self.states.len()
    }

    pub fn n_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn state_names(&self) -> &[String] {
        &self.states
    }

    pub fn input_names(&self) -> &[String] {
        &self.inputs
    }

    pub fn names(&self, class: VarClass) -> &[String] {
        match class {
            VarClass::State => &self.states,
            VarClass::Input => &self.inputs,
        }
    }

    pub fn len(&self, class: VarClass) -> usize {
        self.names(class).len()
    }

    /// Position of `name` within its class, if it exists.
    pub fn index_of(&self, class: VarClass, name: &str) -> Option<usize> {
        self.names(class).iter().position(|n| n == name)
    }
}
