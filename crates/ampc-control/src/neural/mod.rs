//! Approximate MPC: a dense network trained on samples of a reference controller.

mod dataset;
mod network;
mod policy;
mod trainer;

pub use dataset::*;
pub use network::{DenseLayer, Network};
pub use policy::*;
pub use trainer::*;
