use chrono::{DateTime, Utc};
use monoscope_core::{SessionId, TelemetryEvent};
use serde::{Deserialize, Serialize};

/// Body of one replay upload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayPayload {
    pub events: Vec<TelemetryEvent>,
    pub session_id: SessionId,
    pub timestamp: DateTime<Utc>,
    pub event_count: usize,
}

impl ReplayPayload {
    pub fn new(events: Vec<TelemetryEvent>, session_id: SessionId, timestamp: DateTime<Utc>) -> Self {
        let event_count = events.len();
        Self {
            events,
            session_id,
            timestamp,
            event_count,
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Where replay uploads go: `{base_url}/rrweb/{project_id}`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReplayEndpoint {
    base_url: String,
    project_id: String,
}

impl ReplayEndpoint {
    pub fn new(base_url: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            project_id: project_id.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, base_url: impl Into<String>) {
        self.base_url = base_url.into();
    }

    pub fn url(&self) -> String {
        format!("{}/rrweb/{}", self.base_url.trim_end_matches('/'), self.project_id)
    }
}
