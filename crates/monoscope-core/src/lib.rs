pub mod clock;
pub mod constants;
pub mod events;
pub mod identity;
pub mod ids;
pub mod user;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{EventKind, EventParseError, TelemetryEvent};
pub use identity::SessionIdentity;
pub use ids::{SessionId, TabId};
pub use user::MonoscopeUser;
