mod lqr;
pub mod mpc;
pub mod neural;
mod objective;
mod policy;

pub use lqr::*;
pub use objective::*;
pub use policy::*;
