use std::collections::BTreeMap;

use ampc_core::{
    settings::{LqrSettings, MpcSettings, ObjectiveSettings},
    Bounds, ControlError, Input, State, Variables,
};
use serde::{Deserialize, Serialize};

use crate::{Model, ModelKind};

// Kinetic and physical constants of the reactor (time in hours, temperatures in °C).
const K0_AB: f64 = 1.287e12;
const K0_BC: f64 = 1.287e12;
const K0_AD: f64 = 9.043e9;
const E_A_AB: f64 = 9758.3;
const E_A_BC: f64 = 9758.3;
const E_A_AD: f64 = 8560.0;
const H_R_AB: f64 = 4.2;
const H_R_BC: f64 = -11.0;
const H_R_AD: f64 = -41.85;
const RHO: f64 = 0.9342;
const CP: f64 = 3.01;
const CP_K: f64 = 2.0;
const A_R: f64 = 0.215;
const V_R: f64 = 10.01;
const M_K: f64 = 5.0;
const T_IN: f64 = 130.0;
const K_W: f64 = 4032.0;
const C_A0: f64 = (5.7 + 4.5) / 2.0;
const KELVIN: f64 = 273.15;

pub const CSTR_STATES: [&str; 4] = ["C_a", "C_b", "T_R", "T_K"];
pub const CSTR_INPUTS: [&str; 2] = ["F", "Q_dot"];

fn named<const N: usize>(entries: [(&str, f64); N]) -> BTreeMap<String, f64> {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn bounds_map<const N: usize>(entries: [(&str, f64, f64); N]) -> BTreeMap<String, [f64; 2]> {
    entries
        .into_iter()
        .map(|(name, lower, upper)| (name.to_string(), [lower, upper]))
        .collect()
}

/// Settings of the reactor model and its operating envelope.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CstrSettings {
    /// Scaling of the activation energy of the A -> D reaction.
    pub alpha: f64,
    /// Scaling of the rate constant of the A -> B reaction.
    pub beta: f64,
    /// Initial `[C_a, C_b, T_R, T_K]`.
    pub initial_state: [f64; 4],
    /// `name -> [lower, upper]` for the states.
    pub state_bounds: BTreeMap<String, [f64; 2]>,
    /// `name -> [lower, upper]` for the inputs.
    pub input_bounds: BTreeMap<String, [f64; 2]>,
}

impl Default for CstrSettings {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            initial_state: [0.8, 0.5, 134.14, 130.0],
            state_bounds: bounds_map([
                ("C_a", 0.1, 2.0),
                ("C_b", 0.1, 2.0),
                ("T_R", 50.0, 140.0),
                ("T_K", 50.0, 140.0),
            ]),
            input_bounds: bounds_map([("F", 5.0, 100.0), ("Q_dot", -8500.0, 0.0)]),
        }
    }
}

impl CstrSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        for (name, value) in [("alpha", self.alpha), ("beta", self.beta)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ControlError::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if self.initial_state.iter().any(|v| !v.is_finite()) {
            return Err(ControlError::config("initial_state must be finite"));
        }
        Ok(())
    }

    pub fn initial_state(&self) -> State {
        State::from_row_slice(&self.initial_state)
    }
}

/// Continuous stirred-tank reactor with the reactions A -> B -> C and 2A -> D.
///
/// States are the concentrations `C_a`, `C_b` \[mol/l], the reactor temperature `T_R`
/// and the coolant temperature `T_K` \[°C]. Inputs are the normalized feed flow `F` \[1/h]
/// and the heat removed by the coolant `Q_dot` \[kJ/h].
#[derive(Clone, Debug)]
pub struct Cstr {
    variables: Variables,
    alpha: f64,
    beta: f64,
}

impl Cstr {
    pub fn new(settings: &CstrSettings) -> Result<Self, ControlError> {
        settings.validate()?;
        Ok(Self {
            variables: Variables::new(CSTR_STATES, CSTR_INPUTS)?,
            alpha: settings.alpha,
            beta: settings.beta,
        })
    }

    /// The bounds table described by `settings`.
    pub fn bounds(&self, settings: &CstrSettings) -> Result<Bounds, ControlError> {
        Bounds::from_maps(
            self.variables.clone(),
            &settings.state_bounds,
            &settings.input_bounds,
        )
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn beta(&self) -> f64 {
        self.beta
    }

    /// MPC tuning that tracks `C_b = 0.6` with a light penalty on input moves.
    pub fn mpc_settings() -> MpcSettings {
        MpcSettings {
            objective: ObjectiveSettings {
                reference: named([("C_b", 0.6)]),
                stage_weights: named([("C_b", 1.0)]),
                terminal_weights: named([("C_b", 1.0)]),
                rterm: named([("F", 0.1), ("Q_dot", 1e-3)]),
                input_scaling: named([("F", 100.0), ("Q_dot", 2000.0)]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// LQR tuning around the steady state with `C_b = 0.6`.
    pub fn lqr_settings() -> LqrSettings {
        LqrSettings {
            q: named([("C_a", 1.0), ("C_b", 100.0), ("T_R", 0.01), ("T_K", 0.01)]),
            r: named([("F", 1e-3), ("Q_dot", 1e-7)]),
            r_delta: named([("F", 1e-2), ("Q_dot", 1e-6)]),
            operating_state: named([
                ("C_a", 0.8),
                ("C_b", 0.6),
                ("T_R", 134.14),
                ("T_K", 130.0),
            ]),
            operating_input: named([("F", 18.83), ("Q_dot", -4495.7)]),
            ..Default::default()
        }
    }
}

impl Model for Cstr {
    fn kind(&self) -> ModelKind {
        ModelKind::Continuous
    }

    fn variables(&self) -> &Variables {
        &self.variables
    }

    fn rhs(&self, state: &State, input: &Input) -> State {
        let (c_a, c_b, t_r, t_k) = (state[0], state[1], state[2], state[3]);
        let (f, q_dot) = (input[0], input[1]);

        let t_abs = t_r + KELVIN;
        let k_1 = self.beta * K0_AB * (-E_A_AB / t_abs).exp();
        let k_2 = K0_BC * (-E_A_BC / t_abs).exp();
        let k_3 = K0_AD * (-self.alpha * E_A_AD / t_abs).exp();
        let t_dif = t_r - t_k;

        let dc_a = f * (C_A0 - c_a) - k_1 * c_a - k_3 * c_a.powi(2);
        let dc_b = -f * c_b + k_1 * c_a - k_2 * c_b;
        let dt_r = (k_1 * c_a * H_R_AB + k_2 * c_b * H_R_BC + k_3 * c_a.powi(2) * H_R_AD)
            / (-RHO * CP)
            + f * (T_IN - t_r)
            + (K_W * A_R * -t_dif) / (RHO * CP * V_R);
        let dt_k = (q_dot + K_W * A_R * t_dif) / (M_K * CP_K);

        State::from_vec(vec![dc_a, dc_b, dt_r, dt_k])
    }

    /// Accepts `alpha` and `beta`.
    fn with_parameters(&self, parameters: &BTreeMap<String, f64>) -> Result<Self, ControlError> {
        let mut model = self.clone();
        for (name, value) in parameters {
            let slot = match name.as_str() {
                "alpha" => &mut model.alpha,
                "beta" => &mut model.beta,
                _ => {
                    return Err(ControlError::config(format!(
                        "the reactor has no uncertain parameter {:?}",
                        name
                    )))
                }
            };
            if !(value.is_finite() && *value > 0.0) {
                return Err(ControlError::config(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
            *slot = *value;
        }
        Ok(model)
    }
}
