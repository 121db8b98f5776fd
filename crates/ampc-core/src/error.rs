use thiserror::Error;

/// Errors raised by policies, plants, estimators and the closed-loop driver.
#[derive(Debug, Error)]
pub enum ControlError {
    /// A state vector holds non-finite values, or a plant was stepped before it was
    /// initialized.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A vector handed to a component does not have the size the component was built for.
    #[error("dimension mismatch in {context}: expected {expected} components, got {actual}")]
    DimensionMismatch {
        context: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("solver failed: {0}")]
    Solver(String),
    #[error("training diverged at epoch {epoch}")]
    TrainingDiverged { epoch: usize },
    #[error("cannot sample {0}: bounds must be finite")]
    UnboundedSampling(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("model error: {0}")]
    Model(String),
    /// Failure inside an external collaborator, passed through untouched.
    #[error(transparent)]
    Collaborator(Box<dyn std::error::Error + Send + Sync>),
}

impl ControlError {
    pub fn config(msg: impl Into<String>) -> Self {
        ControlError::InvalidConfig(msg.into())
    }
}
