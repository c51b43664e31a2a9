//! Seam to the DOM mutation recorder.
//!
//! The recorder itself lives outside this crate. It is started with a sink
//! and pushes every event it captures synchronously through it.

use std::sync::Arc;

use monoscope_core::{EventParseError, TelemetryEvent};
use serde_json::Value;
use tracing::debug;

use crate::buffer::PushOutcome;
use crate::delivery::DeliveryController;

/// Masking, checkpoint and sampling rules handed to the recorder.
pub type RecordOptions = monoscope_settings::RecordingSettings;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("recorder failed to start: {0}")]
    Start(String),
}

/// Where captured events go.
#[derive(Clone)]
pub struct RecorderSink {
    controller: Arc<DeliveryController>,
}

impl RecorderSink {
    pub fn new(controller: Arc<DeliveryController>) -> Self {
        Self { controller }
    }

    pub fn emit(&self, event: TelemetryEvent) -> PushOutcome {
        self.controller.push(event)
    }

    /// Accept a raw recorder event object. Events without a `type` or
    /// `timestamp` are dropped.
    pub fn emit_raw(&self, raw: Value) -> Result<PushOutcome, EventParseError> {
        match TelemetryEvent::from_recorder(raw) {
            Ok(event) => Ok(self.emit(event)),
            Err(e) => {
                debug!(error = %e, "dropping malformed recorder event");
                Err(e)
            }
        }
    }
}

/// Stops a running recording.
pub trait RecordingHandle: Send {
    fn stop(self: Box<Self>);
}

pub trait Recorder: Send + Sync {
    fn start(&self, sink: RecorderSink, options: &RecordOptions) -> Result<Box<dyn RecordingHandle>, RecorderError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::EventBuffer;
    use crate::payload::{ReplayEndpoint, ReplayPayload};
    use crate::transport::{ReplayTransport, TransportError};
    use async_trait::async_trait;
    use monoscope_core::{ManualClock, SessionId};
    use serde_json::json;

    struct NullTransport;

    #[async_trait]
    impl ReplayTransport for NullTransport {
        async fn send(&self, _url: &str, _payload: &ReplayPayload) -> Result<(), TransportError> {
            Ok(())
        }
    }

    fn sink() -> (RecorderSink, Arc<DeliveryController>) {
        let controller = Arc::new(DeliveryController::new(
            Arc::new(EventBuffer::default()),
            Arc::new(NullTransport),
            ReplayEndpoint::new("http://collector.test", "proj"),
            SessionId::new(),
            Arc::new(ManualClock::default()),
        ));
        (RecorderSink::new(Arc::clone(&controller)), controller)
    }

    #[test]
    fn raw_events_are_classified() {
        let (sink, controller) = sink();
        sink.emit_raw(json!({"type": 4, "timestamp": 1, "data": {"href": "/"}})).unwrap();
        sink.emit_raw(json!({"type": 2, "timestamp": 2, "data": {}})).unwrap();
        sink.emit_raw(json!({"type": 3, "timestamp": 3, "data": {"source": 1}})).unwrap();
        assert_eq!(controller.buffer().len(), 3);
        assert_eq!(controller.buffer().snapshot_count(), 2);
    }

    #[test]
    fn malformed_raw_event_is_dropped() {
        let (sink, controller) = sink();
        assert!(sink.emit_raw(json!({"timestamp": 3})).is_err());
        assert!(sink.emit_raw(json!("not an event")).is_err());
        assert!(controller.buffer().is_empty());
    }
}
