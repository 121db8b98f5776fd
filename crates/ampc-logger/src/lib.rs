mod log_codec;
mod persist;
mod playback;

pub use log_codec::*;
pub use persist::*;
pub use playback::*;
