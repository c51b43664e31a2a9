use monoscope_settings::{AgentConfig, SettingsError};
use opentelemetry::KeyValue;
use regex::RegexSet;

/// Propagate trace headers to every http(s) URL unless told otherwise.
pub const DEFAULT_PROPAGATION_PATTERN: &str = r"^https?://.*";

#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("invalid trace propagation pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Which outgoing request URLs get `traceparent` headers.
#[derive(Clone, Debug)]
pub struct TracePropagation {
    patterns: RegexSet,
}

impl TracePropagation {
    pub fn new<I, S>(patterns: I) -> Result<Self, TracingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            patterns: RegexSet::new(patterns)?,
        })
    }

    pub fn from_config(config: &AgentConfig) -> Result<Self, TracingError> {
        Self::new(&config.propagate_trace_header_cors_urls)
    }

    pub fn should_propagate(&self, url: &str) -> bool {
        self.patterns.is_match(url)
    }
}

impl Default for TracePropagation {
    fn default() -> Self {
        Self {
            patterns: RegexSet::new([DEFAULT_PROPAGATION_PATTERN]).unwrap_or_else(|_| RegexSet::empty()),
        }
    }
}

/// Resource attributes for the tracer provider.
pub fn resource_attributes(config: &AgentConfig) -> Result<Vec<KeyValue>, TracingError> {
    let mut attrs = vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("at-project-id", config.project_id()?.to_string()),
    ];
    attrs.extend(
        config
            .resource_attributes
            .iter()
            .map(|(k, v)| KeyValue::new(k.clone(), v.clone())),
    );
    Ok(attrs)
}
