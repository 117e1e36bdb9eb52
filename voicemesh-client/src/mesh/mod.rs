mod coordinator;
mod observer;
mod session;
mod session_driver;

pub use coordinator::*;
pub use observer::*;
pub use session::*;
