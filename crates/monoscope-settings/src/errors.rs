//! Settings error types.

use thiserror::Error;

/// Errors that can occur when loading or validating agent config.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Failed to read the config file from disk.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// Failed to parse JSON in the config file.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),
    /// `projectId` is absent or blank.
    #[error("config must include projectId")]
    MissingProjectId,
    /// A config value was invalid (e.g., out of range).
    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Result type for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_project_id_display() {
        assert_eq!(
            SettingsError::MissingProjectId.to_string(),
            "config must include projectId"
        );
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad}").unwrap_err();
        let err: SettingsError = json_err.into();
        assert!(matches!(err, SettingsError::Json(_)));
        assert!(err.to_string().contains("parse config JSON"));
    }

    #[test]
    fn invalid_value_display() {
        let err = SettingsError::InvalidValue("delivery.maxEventBatch must be positive".into());
        assert_eq!(
            err.to_string(),
            "invalid config value: delivery.maxEventBatch must be positive"
        );
    }
}
