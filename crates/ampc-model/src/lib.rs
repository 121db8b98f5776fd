mod cstr;
mod integrator;
mod linear;
mod model;

pub use cstr::*;
pub use integrator::*;
pub use linear::*;
pub use model::*;
