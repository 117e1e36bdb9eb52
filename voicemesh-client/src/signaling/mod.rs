mod channel;
mod events;
mod ws_client;

pub use channel::*;
pub use events::*;
pub use ws_client::*;
