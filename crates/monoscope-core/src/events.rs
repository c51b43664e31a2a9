use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};

/// Recorder event type codes (rrweb numbering).
pub mod recorder_type {
    pub const DOM_CONTENT_LOADED: u64 = 0;
    pub const LOAD: u64 = 1;
    pub const FULL_SNAPSHOT: u64 = 2;
    pub const INCREMENTAL_SNAPSHOT: u64 = 3;
    pub const META: u64 = 4;
    pub const CUSTOM: u64 = 5;
    pub const PLUGIN: u64 = 6;
}

/// Replay priority class of an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Self-sufficient checkpoint. Full snapshots and the meta event that
    /// carries the viewport both count.
    Snapshot,
    /// Delta only meaningful after a preceding snapshot.
    Incremental,
}

impl EventKind {
    pub fn from_recorder_type(code: u64) -> Self {
        match code {
            recorder_type::FULL_SNAPSHOT | recorder_type::META => Self::Snapshot,
            _ => Self::Incremental,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventParseError {
    #[error("recorder event is not a JSON object")]
    NotAnObject,
    #[error("recorder event has no numeric `type`")]
    MissingType,
    #[error("recorder event has no numeric `timestamp`")]
    MissingTimestamp,
}

/// One replay event as emitted by the recorder.
///
/// `payload` is the recorder's own JSON object and is exactly what goes on the
/// wire; `kind` and `timestamp` are lifted out of it for buffering decisions.
#[derive(Clone, Debug, PartialEq)]
pub struct TelemetryEvent {
    kind: EventKind,
    timestamp: i64,
    payload: Value,
}

impl TelemetryEvent {
    /// Classify a raw recorder event.
    pub fn from_recorder(payload: Value) -> Result<Self, EventParseError> {
        let obj = payload.as_object().ok_or(EventParseError::NotAnObject)?;
        let code = obj
            .get("type")
            .and_then(Value::as_u64)
            .ok_or(EventParseError::MissingType)?;
        let timestamp = obj
            .get("timestamp")
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)))
            .ok_or(EventParseError::MissingTimestamp)?;
        Ok(Self {
            kind: EventKind::from_recorder_type(code),
            timestamp,
            payload,
        })
    }

    /// Full snapshot event wrapping `data`.
    pub fn snapshot(timestamp: i64, data: Value) -> Self {
        Self::with_type(recorder_type::FULL_SNAPSHOT, timestamp, data)
    }

    /// Incremental snapshot event wrapping `data`.
    pub fn incremental(timestamp: i64, data: Value) -> Self {
        Self::with_type(recorder_type::INCREMENTAL_SNAPSHOT, timestamp, data)
    }

    fn with_type(code: u64, timestamp: i64, data: Value) -> Self {
        Self {
            kind: EventKind::from_recorder_type(code),
            timestamp,
            payload: json!({ "type": code, "timestamp": timestamp, "data": data }),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn is_snapshot(&self) -> bool {
        self.kind == EventKind::Snapshot
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn payload(&self) -> &Value {
        &self.payload
    }

    pub fn into_payload(self) -> Value {
        self.payload
    }
}

impl Serialize for TelemetryEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.payload.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TelemetryEvent {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Self::from_recorder(value).map_err(serde::de::Error::custom)
    }
}
