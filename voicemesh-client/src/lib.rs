//! Peer-to-peer voice mesh: one encrypted audio connection per remote
//! participant, negotiated through a room-scoped signaling channel.

mod config;
mod error;
pub mod media;
mod mesh;
mod registry;
pub mod signaling;
pub mod transport;

pub use config::*;
pub use error::*;
pub use mesh::*;
pub use registry::*;
