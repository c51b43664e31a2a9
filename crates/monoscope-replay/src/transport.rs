//! Replay upload transports.
//!
//! Two strategies: an awaited request with a bounded timeout for normal
//! flushes, and a one-way beacon for the page-teardown flush, where nobody
//! will be around to read a response.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use crate::payload::ReplayPayload;

/// Browsers cap beacon bodies at 64 KiB; larger payloads are refused.
pub const MAX_BEACON_BYTES: usize = 64 * 1024;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("collector returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("timeout after {0:?}")]
    Timeout(Duration),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("beacon refused payload: {0}")]
    BeaconRefused(String),
    #[error("no async runtime to carry the beacon")]
    NoRuntime,
}

impl TransportError {
    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Network(_) => "network",
            Self::Status { .. } => "status",
            Self::Timeout(_) => "timeout",
            Self::Serialization(_) => "serialization",
            Self::BeaconRefused(_) => "beacon_refused",
            Self::NoRuntime => "no_runtime",
        }
    }

    fn from_reqwest(e: &reqwest::Error, timeout: Duration) -> Self {
        if e.is_timeout() {
            Self::Timeout(timeout)
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// Awaited upload.
#[async_trait]
pub trait ReplayTransport: Send + Sync {
    async fn send(&self, url: &str, payload: &ReplayPayload) -> Result<(), TransportError>;
}

/// Fire-and-forget upload. Returning `Ok` only means the payload was handed
/// off; delivery is never confirmed.
pub trait BeaconTransport: Send + Sync {
    fn send_beacon(&self, url: &str, payload: &ReplayPayload) -> Result<(), TransportError>;
}

/// `reqwest`-backed transport implementing both strategies.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self { client, timeout })
    }

    pub fn with_client(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ReplayTransport for HttpTransport {
    async fn send(&self, url: &str, payload: &ReplayPayload) -> Result<(), TransportError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&e, self.timeout))?;

        let status = response.status();
        if status.is_success() {
            debug!(url, status = status.as_u16(), events = payload.event_count, "replay upload accepted");
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(TransportError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

impl BeaconTransport for HttpTransport {
    fn send_beacon(&self, url: &str, payload: &ReplayPayload) -> Result<(), TransportError> {
        let body = payload
            .to_json_bytes()
            .map_err(|e| TransportError::Serialization(e.to_string()))?;
        if body.len() > MAX_BEACON_BYTES {
            return Err(TransportError::BeaconRefused(format!(
                "{} bytes exceeds {MAX_BEACON_BYTES}",
                body.len()
            )));
        }
        let handle = tokio::runtime::Handle::try_current().map_err(|_| TransportError::NoRuntime)?;

        let request = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .timeout(self.timeout);
        let url = url.to_string();
        let events = payload.event_count;
        drop(handle.spawn(async move {
            match request.send().await {
                Ok(resp) if resp.status().is_success() => {
                    debug!(url = %url, events, "beacon delivered");
                }
                Ok(resp) => {
                    warn!(url = %url, status = resp.status().as_u16(), events, "beacon rejected by collector");
                }
                Err(e) => {
                    warn!(url = %url, error = %e, events, "beacon failed");
                }
            }
        }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use monoscope_core::{SessionId, TelemetryEvent};
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn payload(n: i64) -> ReplayPayload {
        let events = (0..n)
            .map(|i| TelemetryEvent::incremental(i, json!({"i": i})))
            .collect();
        ReplayPayload::new(events, SessionId::new(), Utc::now())
    }

    fn transport() -> HttpTransport {
        HttpTransport::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn posts_json_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rrweb/proj"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let body = payload(3);
        transport()
            .send(&format!("{}/rrweb/proj", server.uri()), &body)
            .await
            .unwrap();

        let received = server.received_requests().await.unwrap();
        let sent: ReplayPayload = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(sent.event_count, 3);
        assert_eq!(sent.session_id, body.session_id);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = transport()
            .send(&format!("{}/rrweb/proj", server.uri()), &payload(1))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Status {
                status: 503,
                body: "overloaded".into()
            }
        );
        assert_eq!(err.error_kind(), "status");
    }

    #[tokio::test]
    async fn slow_collector_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(Duration::from_millis(50)).unwrap();
        let err = transport
            .send(&format!("{}/rrweb/proj", server.uri()), &payload(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn unreachable_collector_is_network_error() {
        let err = transport()
            .send("http://127.0.0.1:9/rrweb/proj", &payload(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Network(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn beacon_returns_before_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rrweb/proj"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        transport()
            .send_beacon(&format!("{}/rrweb/proj", server.uri()), &payload(2))
            .unwrap();

        let mut received = Vec::new();
        for _ in 0..50 {
            received = server.received_requests().await.unwrap();
            if !received.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(received.len(), 1);
        let sent: ReplayPayload = serde_json::from_slice(&received[0].body).unwrap();
        assert_eq!(sent.event_count, 2);
    }

    #[tokio::test]
    async fn beacon_refuses_oversized_payload() {
        let big = "x".repeat(MAX_BEACON_BYTES);
        let body = ReplayPayload::new(
            vec![TelemetryEvent::incremental(1, json!({ "blob": big }))],
            SessionId::new(),
            Utc::now(),
        );
        let err = transport()
            .send_beacon("http://127.0.0.1:9/rrweb/proj", &body)
            .unwrap_err();
        assert!(matches!(err, TransportError::BeaconRefused(_)));
    }

    #[test]
    fn beacon_without_runtime_is_refused() {
        let err = transport()
            .send_beacon("http://127.0.0.1:9/rrweb/proj", &payload(1))
            .unwrap_err();
        assert_eq!(err, TransportError::NoRuntime);
    }
}
