//! Closed-loop execution and dataset generation.

mod closed_loop;
mod sampler;

pub use closed_loop::*;
pub use sampler::*;
