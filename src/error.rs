use monoscope_replay::{RecorderError, TransportError};
use monoscope_settings::SettingsError;
use monoscope_tracing::TracingError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    Config(#[from] SettingsError),
    #[error("transport setup failed: {0}")]
    Transport(#[from] TransportError),
    #[error("recorder failed: {0}")]
    Recorder(#[from] RecorderError),
    #[error("tracing setup failed: {0}")]
    Tracing(#[from] TracingError),
    #[error("start() needs a running tokio runtime")]
    NoRuntime,
}
