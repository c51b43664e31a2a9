//! Browser-session telemetry agent.
//!
//! An [`Agent`] owns one session identity, a replay event pipeline and the
//! trace attribute binder, and reacts to page lifecycle signals forwarded by
//! the host.

mod agent;
mod error;
mod lifecycle;

pub use agent::{Agent, Collaborators};
pub use error::AgentError;
pub use lifecycle::{InteractionKind, Visibility};

pub use monoscope_core::{MonoscopeUser, SessionId, SessionIdentity, TabId, TelemetryEvent};
pub use monoscope_replay::{DeliveryStats, FlushMode, FlushOutcome, PushOutcome};
pub use monoscope_settings::AgentConfig;
