use std::path::Path;

use ampc_core::{
    settings::{
        LoopSettings, LqrSettings, MpcSettings, SamplerSettings, SimulatorSettings,
        TrainerSettings,
    },
    ControlError,
};
use ampc_model::{Cstr, CstrSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Everything the binary can be configured with, as read from `--settings-file`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub cstr: CstrSettings,
    pub simulator: SimulatorSettings,
    pub closed_loop: LoopSettings,
    pub mpc: MpcSettings,
    pub lqr: LqrSettings,
    pub sampler: SamplerSettings,
    pub trainer: TrainerSettings,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            cstr: CstrSettings::default(),
            simulator: SimulatorSettings::default(),
            closed_loop: LoopSettings::default(),
            mpc: Cstr::mpc_settings(),
            lqr: Cstr::lqr_settings(),
            sampler: SamplerSettings::default(),
            trainer: TrainerSettings::default(),
        }
    }
}

/// Overwrites the leaves of `base` with those of `patch`, recursing into objects.
fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => merge(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

impl AppSettings {
    /// Reads the settings file on top of the defaults, or returns the defaults when no
    /// file is given. Sections the file leaves out, at any depth, keep their defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let settings = match path {
            Some(path) => {
                let patch: Value = ampc_logger::load_json(path)?;
                let mut value = serde_json::to_value(AppSettings::default())?;
                merge(&mut value, patch);
                let settings: AppSettings = serde_json::from_value(value)
                    .with_context(|| format!("parsing {}", path.display()))?;
                tracing::info!("Loaded settings from {}", path.display());
                settings
            }
            None => AppSettings::default(),
        };
        settings
            .validate()
            .context("invalid settings file")?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ControlError> {
        self.cstr.validate()?;
        self.simulator.validate()?;
        self.closed_loop.validate()?;
        self.mpc.validate()?;
        self.lqr.validate()?;
        self.sampler.validate()?;
        self.trainer.validate()
    }
}
