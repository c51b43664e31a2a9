use std::time::Duration;

use monoscope_core::constants::{FLUSH_INTERVAL, MAX_EVENT_BATCH, MAX_RETRY_EVENTS, REQUEST_TIMEOUT};
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Replay buffering and upload settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliverySettings {
    /// Buffer length that triggers an immediate flush.
    pub max_event_batch: usize,
    /// Hard bound on buffered events; snapshots are kept past it.
    pub max_retry_events: usize,
    /// Periodic flush interval in milliseconds.
    pub flush_interval_ms: u64,
    /// Upload timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            max_event_batch: MAX_EVENT_BATCH,
            max_retry_events: MAX_RETRY_EVENTS,
            flush_interval_ms: FLUSH_INTERVAL.as_millis() as u64,
            request_timeout_ms: REQUEST_TIMEOUT.as_millis() as u64,
        }
    }
}

impl DeliverySettings {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_event_batch == 0 {
            return Err(SettingsError::InvalidValue("delivery.maxEventBatch must be positive".into()));
        }
        if self.max_retry_events < self.max_event_batch {
            return Err(SettingsError::InvalidValue(format!(
                "delivery.maxRetryEvents ({}) must be at least maxEventBatch ({})",
                self.max_retry_events, self.max_event_batch
            )));
        }
        if self.flush_interval_ms == 0 {
            return Err(SettingsError::InvalidValue("delivery.flushIntervalMs must be positive".into()));
        }
        Ok(())
    }
}
