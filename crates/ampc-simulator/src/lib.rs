mod estimator;
mod simulator;

pub use estimator::*;
pub use simulator::*;
