mod capture;
#[cfg(feature = "microphone")]
mod cpal_capture;
mod local_media;
pub mod mulaw;
mod synthetic;

pub use capture::*;
#[cfg(feature = "microphone")]
pub use cpal_capture::*;
pub use local_media::*;
pub use synthetic::*;
