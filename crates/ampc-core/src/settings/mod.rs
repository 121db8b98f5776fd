//! Immutable configuration for every component of the workspace.
//!
//! Each struct enumerates all recognized options with their defaults, deserializes from
//! JSON with missing fields filled from [`Default`], and is checked once by `validate`
//! when the owning component is constructed.

mod controller_settings;
mod executor_settings;
mod trainer_settings;

pub use controller_settings::*;
pub use executor_settings::*;
pub use trainer_settings::*;

use crate::ControlError;

pub(crate) fn ensure(condition: bool, msg: impl FnOnce() -> String) -> Result<(), ControlError> {
    if condition {
        Ok(())
    } else {
        Err(ControlError::InvalidConfig(msg()))
    }
}

pub(crate) fn positive(name: &str, value: f64) -> Result<(), ControlError> {
    ensure(value.is_finite() && value > 0.0, || {
        format!("{} must be positive and finite, got {}", name, value)
    })
}
