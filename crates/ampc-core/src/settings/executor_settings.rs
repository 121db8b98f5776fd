use serde::{Deserialize, Serialize};

use super::{ensure, positive};
use crate::ControlError;

/// Settings for the closed-loop driver.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopSettings {
    /// Number of control iterations in one run.
    pub n_steps: usize,
    /// Whether policy outputs are clamped to the input bounds before being applied.
    pub clip_to_bounds: bool,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            n_steps: 100,
            clip_to_bounds: true,
        }
    }
}

impl LoopSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        ensure(self.n_steps > 0, || "n_steps must be at least 1".into())
    }
}

/// Settings for the plant simulator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Length of one simulator step, in model time units (hours for the CSTR).
    pub t_step: f64,
    /// Number of RK4 sub-steps per simulator step. Ignored for discrete models.
    pub substeps: usize,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            t_step: 0.005,
            substeps: 4,
        }
    }
}

impl SimulatorSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        positive("t_step", self.t_step)?;
        ensure(self.substeps > 0, || "substeps must be at least 1".into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        LoopSettings::default().validate().unwrap();
        SimulatorSettings::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: LoopSettings = serde_json::from_str(r#"{"n_steps": 50}"#).unwrap();
        assert_eq!(settings.n_steps, 50);
        assert!(settings.clip_to_bounds);
    }

    #[test]
    fn test_invalid_values() {
        let settings = LoopSettings {
            n_steps: 0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());

        let settings = SimulatorSettings {
            t_step: -1.0,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }
}
