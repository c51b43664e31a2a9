//! Defaults shared across the agent crates.

use std::time::Duration;

/// Store key holding the current session id.
pub const SESSION_ID_KEY: &str = "monoscope-session-id";
/// Store key holding the last activity time as epoch millis.
pub const LAST_ACTIVITY_KEY: &str = "monoscope-last-activity";

/// Inactivity after which a session is rotated.
pub const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);
/// Minimum gap between two persisted activity writes.
pub const ACTIVITY_PERSIST_INTERVAL: Duration = Duration::from_secs(5);

/// Buffer length that triggers an immediate flush.
pub const MAX_EVENT_BATCH: usize = 50;
/// Hard bound on buffered events, including ones waiting for a retry.
pub const MAX_RETRY_EVENTS: usize = 1000;
/// Periodic flush interval.
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(10);
/// Grace period given to a replay upload before it counts as failed.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_SERVICE_NAME: &str = "monoscope-agent";
pub const DEFAULT_EXPORTER_ENDPOINT: &str = "http://otelcol.apitoolkit.io:4318";
pub const DEFAULT_REPLAY_BASE_URL: &str = "https://app.monoscope.tech";
