//! Session identity state machine.

mod manager;
mod observer;

pub use manager::{Resolution, SessionConfig, SessionManager, SessionState};
pub use observer::SessionObserver;
