//! Config loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`AgentConfig::default()`]
//! 2. If a config file is given and exists, deep-merge its values over defaults
//! 3. Apply `MONOSCOPE_*` environment overrides (highest priority)
//! 4. Validate

use std::path::Path;

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::AgentConfig;

/// Load config from an optional file plus env overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<AgentConfig> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => AgentConfig::default(),
    };
    apply_env_overrides(&mut config);
    config.validate()?;
    Ok(config)
}

/// Read a config file deep-merged over defaults. No env, no validation.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn read_config_file(path: &Path) -> Result<AgentConfig> {
    let defaults = serde_json::to_value(AgentConfig::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading config from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "config file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `MONOSCOPE_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut AgentConfig) {
    apply_overrides_from(config, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`.
///
/// Invalid values are ignored with a warning, falling back to file/default.
pub fn apply_overrides_from(config: &mut AgentConfig, lookup: impl Fn(&str) -> Option<String>) {
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    if let Some(v) = string("MONOSCOPE_PROJECT_ID") {
        config.project_id = Some(v);
    }
    if let Some(v) = string("MONOSCOPE_SERVICE_NAME") {
        config.service_name = v;
    }
    if let Some(v) = string("MONOSCOPE_EXPORTER_ENDPOINT") {
        config.exporter_endpoint = Some(v);
    }
    if let Some(v) = string("MONOSCOPE_REPLAY_URL") {
        config.replay_events_base_url = Some(v);
    }
    if let Some(v) = checked("MONOSCOPE_DEBUG", string("MONOSCOPE_DEBUG"), parse_bool) {
        config.debug = v;
    }
    if let Some(v) = checked("MONOSCOPE_MAX_EVENT_BATCH", string("MONOSCOPE_MAX_EVENT_BATCH"), |s| {
        parse_usize_range(s, 1, 10_000)
    }) {
        config.delivery.max_event_batch = v;
    }
    if let Some(v) = checked("MONOSCOPE_MAX_RETRY_EVENTS", string("MONOSCOPE_MAX_RETRY_EVENTS"), |s| {
        parse_usize_range(s, 1, 1_000_000)
    }) {
        config.delivery.max_retry_events = v;
    }
    if let Some(v) = checked("MONOSCOPE_FLUSH_INTERVAL_MS", string("MONOSCOPE_FLUSH_INTERVAL_MS"), |s| {
        parse_u64_range(s, 100, 3_600_000)
    }) {
        config.delivery.flush_interval_ms = v;
    }
    if let Some(v) = checked("MONOSCOPE_SESSION_TIMEOUT_MS", string("MONOSCOPE_SESSION_TIMEOUT_MS"), |s| {
        parse_u64_range(s, 1000, 86_400_000)
    }) {
        config.session.timeout_ms = v;
    }
}

fn checked<T>(key: &str, raw: Option<String>, parse: impl Fn(&str) -> Option<T>) -> Option<T> {
    let val = raw?;
    let result = parse(&val);
    if result.is_none() {
        tracing::warn!(key, value = %val, "invalid env override, ignoring");
    }
    result
}

// ── Pure parsing functions ───────────────────────────────────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}
