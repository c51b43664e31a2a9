//! Config type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` to match the JSON the
//! agent is configured with, and `#[serde(default)]` so partial JSON fills
//! the rest from compiled defaults.

mod delivery;
mod recording;

pub use delivery::*;
pub use recording::*;

use std::collections::BTreeMap;
use std::time::Duration;

use monoscope_core::constants::{
    ACTIVITY_PERSIST_INTERVAL, DEFAULT_EXPORTER_ENDPOINT, DEFAULT_REPLAY_BASE_URL, DEFAULT_SERVICE_NAME,
    SESSION_TIMEOUT,
};
use monoscope_core::MonoscopeUser;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root configuration of one agent instance.
///
/// ```json
/// {
///   "projectId": "p-123",
///   "serviceName": "storefront",
///   "delivery": { "maxEventBatch": 25 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgentConfig {
    /// Collector project. Required.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// `service.name` resource attribute.
    pub service_name: String,
    /// OTLP/HTTP endpoint for spans.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exporter_endpoint: Option<String>,
    /// Base URL that replay uploads go under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_events_base_url: Option<String>,
    /// Extra resource attributes for every span.
    pub resource_attributes: BTreeMap<String, String>,
    /// URL patterns (regex) that receive trace propagation headers.
    pub propagate_trace_header_cors_urls: Vec<String>,
    /// Initial end-user identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<MonoscopeUser>,
    /// Verbose agent logging.
    pub debug: bool,
    pub session: SessionSettings,
    pub delivery: DeliverySettings,
    pub recording: RecordingSettings,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            exporter_endpoint: None,
            replay_events_base_url: None,
            resource_attributes: BTreeMap::new(),
            propagate_trace_header_cors_urls: vec![r"^https?://.*".to_string()],
            user: None,
            debug: false,
            session: SessionSettings::default(),
            delivery: DeliverySettings::default(),
            recording: RecordingSettings::default(),
        }
    }
}

impl AgentConfig {
    /// Defaults plus the one required field.
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: Some(project_id.into()),
            ..Self::default()
        }
    }

    /// The project id, or the construction-time error if it is absent.
    pub fn project_id(&self) -> Result<&str> {
        self.project_id
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or(SettingsError::MissingProjectId)
    }

    pub fn exporter_endpoint(&self) -> &str {
        self.exporter_endpoint
            .as_deref()
            .unwrap_or(DEFAULT_EXPORTER_ENDPOINT)
    }

    pub fn replay_events_base_url(&self) -> &str {
        self.replay_events_base_url
            .as_deref()
            .unwrap_or(DEFAULT_REPLAY_BASE_URL)
    }

    /// Reject configs the agent cannot start with.
    pub fn validate(&self) -> Result<()> {
        let _ = self.project_id()?;
        if self.service_name.trim().is_empty() {
            return Err(SettingsError::InvalidValue("serviceName must not be empty".into()));
        }
        if self.session.timeout_ms == 0 {
            return Err(SettingsError::InvalidValue("session.timeoutMs must be positive".into()));
        }
        self.delivery.validate()
    }
}

/// Session lifetime settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Inactivity after which the session id rotates.
    pub timeout_ms: u64,
    /// Minimum gap between persisted activity writes.
    pub activity_persist_interval_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeout_ms: SESSION_TIMEOUT.as_millis() as u64,
            activity_persist_interval_ms: ACTIVITY_PERSIST_INTERVAL.as_millis() as u64,
        }
    }
}

impl SessionSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn activity_persist_interval(&self) -> Duration {
        Duration::from_millis(self.activity_persist_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let config = AgentConfig::default();
        assert_eq!(config.service_name, "monoscope-agent");
        assert_eq!(config.session.timeout(), Duration::from_secs(1800));
        assert_eq!(config.session.activity_persist_interval(), Duration::from_secs(5));
        assert_eq!(config.delivery.max_event_batch, 50);
        assert_eq!(config.delivery.max_retry_events, 1000);
        assert_eq!(config.exporter_endpoint(), "http://otelcol.apitoolkit.io:4318");
        assert_eq!(config.replay_events_base_url(), "https://app.monoscope.tech");
    }

    #[test]
    fn missing_project_id_fails_validation() {
        let err = AgentConfig::default().validate().unwrap_err();
        assert!(matches!(err, SettingsError::MissingProjectId));

        let blank = AgentConfig::new("   ");
        assert!(matches!(blank.validate(), Err(SettingsError::MissingProjectId)));
    }

    #[test]
    fn new_config_is_valid() {
        let config = AgentConfig::new("proj");
        config.validate().unwrap();
        assert_eq!(config.project_id().unwrap(), "proj");
    }

    #[test]
    fn zero_session_timeout_rejected() {
        let mut config = AgentConfig::new("proj");
        config.session.timeout_ms = 0;
        assert!(matches!(config.validate(), Err(SettingsError::InvalidValue(_))));
    }

    #[test]
    fn json_field_names_are_camel_case() {
        let json = serde_json::to_value(AgentConfig::new("p")).unwrap();
        assert_eq!(json["projectId"], "p");
        assert!(json.get("serviceName").is_some());
        assert!(json.get("propagateTraceHeaderCorsUrls").is_some());
        assert!(json["delivery"].get("maxRetryEvents").is_some());
        assert!(json.get("user").is_none());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AgentConfig =
            serde_json::from_str(r#"{"projectId":"p","delivery":{"maxEventBatch":5}}"#).unwrap();
        assert_eq!(config.delivery.max_event_batch, 5);
        assert_eq!(config.delivery.max_retry_events, 1000);
        assert_eq!(config.service_name, "monoscope-agent");
    }
}
