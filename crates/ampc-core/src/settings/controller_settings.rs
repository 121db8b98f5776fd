use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{ensure, positive};
use crate::ControlError;

fn finite_map(field: &str, map: &BTreeMap<String, f64>) -> Result<(), ControlError> {
    for (name, value) in map {
        ensure(value.is_finite(), || {
            format!("{}.{} must be finite, got {}", field, name, value)
        })?;
    }
    Ok(())
}

fn non_negative_map(field: &str, map: &BTreeMap<String, f64>) -> Result<(), ControlError> {
    for (name, value) in map {
        ensure(value.is_finite() && *value >= 0.0, || {
            format!("{}.{} must be non-negative, got {}", field, name, value)
        })?;
    }
    Ok(())
}

/// Quadratic tracking objective of the MPC problem.
///
/// Stage and terminal costs are `sum_i w_i (x_i - ref_i)^2`; the input-rate term is
/// `sum_i r_i ((u_i - u_prev_i) / scale_i)^2`. Names refer to the model's variables;
/// variables without an entry get weight zero and scale one. The default tracks nothing,
/// models provide their own weights.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectiveSettings {
    /// Reference value per state.
    pub reference: BTreeMap<String, f64>,
    /// Lagrange term weights, applied at every step of the horizon.
    pub stage_weights: BTreeMap<String, f64>,
    /// Meyer term weights, applied to the state at the end of the horizon.
    pub terminal_weights: BTreeMap<String, f64>,
    /// Input-rate penalty per input (the "r-term").
    pub rterm: BTreeMap<String, f64>,
    /// Scaling applied to input changes before the r-term.
    pub input_scaling: BTreeMap<String, f64>,
    /// Weight of the squared distance of predicted states to their bounds.
    pub bound_penalty: f64,
    /// Whether the state at the end of the horizon is penalized against the terminal
    /// bounds instead of going unconstrained.
    pub use_terminal_bounds: bool,
    /// `name -> [lower, upper]` for the terminal state. States without an entry use
    /// their regular bounds.
    pub terminal_bounds: BTreeMap<String, [f64; 2]>,
}

impl Default for ObjectiveSettings {
    fn default() -> Self {
        Self {
            reference: BTreeMap::new(),
            stage_weights: BTreeMap::new(),
            terminal_weights: BTreeMap::new(),
            rterm: BTreeMap::new(),
            input_scaling: BTreeMap::new(),
            bound_penalty: 1e3,
            use_terminal_bounds: true,
            terminal_bounds: BTreeMap::new(),
        }
    }
}

impl ObjectiveSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        finite_map("reference", &self.reference)?;
        non_negative_map("stage_weights", &self.stage_weights)?;
        non_negative_map("terminal_weights", &self.terminal_weights)?;
        non_negative_map("rterm", &self.rterm)?;
        for (name, scale) in &self.input_scaling {
            positive(&format!("input_scaling.{}", name), *scale)?;
        }
        for (name, [lower, upper]) in &self.terminal_bounds {
            ensure(lower <= upper, || {
                format!(
                    "terminal_bounds.{}: lower bound {} above upper bound {}",
                    name, lower, upper
                )
            })?;
        }
        ensure(
            self.bound_penalty.is_finite() && self.bound_penalty >= 0.0,
            || format!("bound_penalty must be non-negative, got {}", self.bound_penalty),
        )
    }
}

/// Settings of the sampling-based optimal control solver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverSettings {
    /// Number of perturbed input sequences drawn per iteration.
    pub n_samples: usize,
    /// Number of refinement iterations per solve.
    pub n_iterations: usize,
    /// Temperature of the softmax weighting of sample costs.
    pub lambda: f64,
    /// Standard deviation of the perturbations, as a fraction of each input's range.
    pub noise_fraction: f64,
    /// Seed the random generator is reset to on every solve.
    pub seed: u64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            n_samples: 128,
            n_iterations: 3,
            lambda: 1e-3,
            noise_fraction: 0.15,
            seed: 42,
        }
    }
}

impl SolverSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        ensure(self.n_samples > 0, || "n_samples must be at least 1".into())?;
        ensure(self.n_iterations > 0, || "n_iterations must be at least 1".into())?;
        positive("lambda", self.lambda)?;
        positive("noise_fraction", self.noise_fraction)
    }
}

/// Settings of the optimization-based controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MpcSettings {
    /// Prediction horizon, in steps.
    pub n_horizon: usize,
    /// Length of one prediction step.
    pub t_step: f64,
    /// RK4 sub-steps per prediction step.
    pub substeps: usize,
    /// Candidate values of uncertain model parameters. The first value of each list is
    /// the nominal one.
    pub uncertainty: BTreeMap<String, Vec<f64>>,
    /// Number of stages over which the uncertain parameters branch into scenarios; the
    /// last branch holds for the rest of the horizon. `0` plans with nominal values.
    pub n_robust: usize,
    pub objective: ObjectiveSettings,
    pub solver: SolverSettings,
}

impl Default for MpcSettings {
    fn default() -> Self {
        Self {
            n_horizon: 20,
            t_step: 0.005,
            substeps: 1,
            uncertainty: BTreeMap::new(),
            n_robust: 0,
            objective: ObjectiveSettings::default(),
            solver: SolverSettings::default(),
        }
    }
}

impl MpcSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        ensure(self.n_horizon > 0, || "n_horizon must be at least 1".into())?;
        positive("t_step", self.t_step)?;
        ensure(self.substeps > 0, || "substeps must be at least 1".into())?;
        for (name, values) in &self.uncertainty {
            ensure(!values.is_empty(), || {
                format!("uncertainty.{} needs at least the nominal value", name)
            })?;
            ensure(values.iter().all(|v| v.is_finite()), || {
                format!("uncertainty.{} must be finite", name)
            })?;
        }
        self.objective.validate()?;
        self.solver.validate()
    }
}

/// Operating mode of the LQR.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LqrMode {
    /// `u = K (x - x_ss) + u_ss`.
    #[default]
    SetPointTrack,
    /// Penalizes input changes by augmenting the state with the previous input.
    InputRatePenalization,
}

/// Settings of the linear-quadratic regulator.
///
/// All weight maps describe diagonal matrices by variable name. The default has no
/// weights and no operating point; both depend on the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LqrSettings {
    /// Horizon of the finite-horizon gain. `0` computes the infinite-horizon gain.
    pub n_horizon: usize,
    /// Sampling time used to discretize continuous models.
    pub t_sample: f64,
    pub mode: LqrMode,
    /// State weights.
    pub q: BTreeMap<String, f64>,
    /// Input weights.
    pub r: BTreeMap<String, f64>,
    /// Terminal weights for the finite-horizon gain. Empty means `q`.
    pub p: BTreeMap<String, f64>,
    /// Input-rate weights, required in [`LqrMode::InputRatePenalization`].
    pub r_delta: BTreeMap<String, f64>,
    /// State the model is linearized around and the set point is taken from.
    pub operating_state: BTreeMap<String, f64>,
    /// Input the model is linearized around.
    pub operating_input: BTreeMap<String, f64>,
    /// Iteration cap of the infinite-horizon Riccati iteration.
    pub max_iterations: usize,
    /// Convergence tolerance of the Riccati iteration.
    pub tolerance: f64,
}

impl Default for LqrSettings {
    fn default() -> Self {
        Self {
            n_horizon: 0,
            t_sample: 0.005,
            mode: LqrMode::SetPointTrack,
            q: BTreeMap::new(),
            r: BTreeMap::new(),
            p: BTreeMap::new(),
            r_delta: BTreeMap::new(),
            operating_state: BTreeMap::new(),
            operating_input: BTreeMap::new(),
            max_iterations: 10_000,
            tolerance: 1e-9,
        }
    }
}

impl LqrSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        positive("t_sample", self.t_sample)?;
        non_negative_map("q", &self.q)?;
        non_negative_map("r", &self.r)?;
        non_negative_map("p", &self.p)?;
        non_negative_map("r_delta", &self.r_delta)?;
        finite_map("operating_state", &self.operating_state)?;
        finite_map("operating_input", &self.operating_input)?;
        if self.mode == LqrMode::InputRatePenalization {
            ensure(!self.r_delta.is_empty(), || {
                "r_delta must be set for input rate penalization".into()
            })?;
        }
        ensure(self.max_iterations > 0, || "max_iterations must be at least 1".into())?;
        positive("tolerance", self.tolerance)
    }
}
