use serde::{Deserialize, Serialize};

use super::{ensure, positive};
use crate::ControlError;

/// Activation function of a hidden layer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    #[default]
    Tanh,
    Relu,
    Linear,
}

/// How the sampler draws the states it labels with the reference controller.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SamplingMode {
    /// Independent uniform draws inside the state bounds.
    #[default]
    Random,
    /// Short closed-loop rollouts of the reference controller from random initial states.
    ClosedLoop,
}

/// Settings for generating a training dataset.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerSettings {
    pub mode: SamplingMode,
    /// Number of (state, input) pairs in the dataset.
    pub n_samples: usize,
    /// Length of each rollout in [`SamplingMode::ClosedLoop`].
    pub trajectory_length: usize,
    pub seed: u64,
}

impl Default for SamplerSettings {
    fn default() -> Self {
        Self {
            mode: SamplingMode::Random,
            n_samples: 500,
            trajectory_length: 20,
            seed: 1,
        }
    }
}

impl SamplerSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        ensure(self.n_samples > 0, || "n_samples must be at least 1".into())?;
        ensure(self.trajectory_length > 0, || {
            "trajectory_length must be at least 1".into()
        })
    }
}

/// Reduce-on-plateau learning rate schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    /// Factor the learning rate is multiplied with on a plateau.
    pub factor: f64,
    /// Epochs without relative improvement larger than `threshold` before decaying.
    pub patience: usize,
    pub threshold: f64,
    /// Lower limit of the learning rate.
    pub min_lr: f64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            factor: 0.5,
            patience: 25,
            threshold: 1e-4,
            min_lr: 1e-6,
        }
    }
}

impl SchedulerSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        ensure(self.factor > 0.0 && self.factor < 1.0, || {
            format!("factor must be in (0, 1), got {}", self.factor)
        })?;
        ensure(self.threshold.is_finite() && self.threshold >= 0.0, || {
            format!("threshold must be non-negative, got {}", self.threshold)
        })?;
        positive("min_lr", self.min_lr)
    }
}

/// Settings for fitting the approximate controller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerSettings {
    pub epochs: usize,
    pub learning_rate: f64,
    pub hidden_layers: usize,
    /// Neurons per hidden layer.
    pub neurons: usize,
    pub activation: Activation,
    /// Seed of the weight initialization.
    pub seed: u64,
    /// Optional learning rate decay on plateau.
    pub scheduler: Option<SchedulerSettings>,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            epochs: 1000,
            learning_rate: 1e-2,
            hidden_layers: 1,
            neurons: 50,
            activation: Activation::Tanh,
            seed: 0,
            scheduler: Some(SchedulerSettings::default()),
        }
    }
}

impl TrainerSettings {
    pub fn validate(&self) -> Result<(), ControlError> {
        ensure(self.epochs > 0, || "epochs must be at least 1".into())?;
        positive("learning_rate", self.learning_rate)?;
        ensure(self.neurons > 0 || self.hidden_layers == 0, || {
            "neurons must be at least 1".into()
        })?;
        if let Some(scheduler) = &self.scheduler {
            scheduler.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        SamplerSettings::default().validate().unwrap();
        TrainerSettings::default().validate().unwrap();
    }

    #[test]
    fn test_scheduler_factor_range() {
        let scheduler = SchedulerSettings {
            factor: 1.5,
            ..Default::default()
        };
        assert!(scheduler.validate().is_err());
    }

    #[test]
    fn test_scheduler_can_be_disabled() {
        let settings: TrainerSettings =
            serde_json::from_str(r#"{"scheduler": null, "activation": "Relu"}"#).unwrap();
        assert!(settings.scheduler.is_none());
        assert_eq!(settings.activation, Activation::Relu);
        settings.validate().unwrap();
    }
}
