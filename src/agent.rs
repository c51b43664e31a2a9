use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use monoscope_core::{Clock, MonoscopeUser, SessionId, SystemClock, TabId, TelemetryEvent};
use monoscope_replay::{
    BeaconTransport, BufferLimits, DeliveryController, DeliveryStats, EventBuffer, FlushMode, FlushOutcome,
    HttpTransport, PushOutcome, Recorder, RecorderSink, RecordingHandle, ReplayEndpoint, ReplayTransport,
};
use monoscope_session::{SessionConfig, SessionManager, SessionState};
use monoscope_settings::AgentConfig;
use monoscope_store::{IdentityStore, MemoryIdentityStore};
use monoscope_telemetry::{init_logging, LoggingConfig};
use monoscope_tracing::{
    register_instrumentations, resource_attributes, AttributeCallback, Instrumentation, InstrumentationHooks,
    OtelSpan, SpanAttributes, SpanHookInstrumentation, TracePropagation, TraceSessionBinder,
};
use opentelemetry::KeyValue;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::AgentError;
use crate::lifecycle::{InteractionKind, Visibility};

/// Pluggable pieces of an agent. Anything left unset gets the production
/// default: an in-memory identity store, the system clock and an HTTP
/// transport doubling as the beacon.
pub struct Collaborators {
    pub store: Arc<dyn IdentityStore>,
    pub clock: Arc<dyn Clock>,
    pub transport: Option<Arc<dyn ReplayTransport>>,
    pub beacon: Option<Arc<dyn BeaconTransport>>,
    pub recorder: Option<Arc<dyn Recorder>>,
    /// Instrumentations beyond the built-in document-load, fetch and XHR.
    pub instrumentations: Vec<Arc<dyn Instrumentation>>,
    pub hooks: InstrumentationHooks,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            store: Arc::new(MemoryIdentityStore::new()),
            clock: Arc::new(SystemClock),
            transport: None,
            beacon: None,
            recorder: None,
            instrumentations: Vec::new(),
            hooks: InstrumentationHooks::default(),
        }
    }
}

struct Running {
    cancel: CancellationToken,
    worker: JoinHandle<()>,
    recording: Option<Box<dyn RecordingHandle>>,
}

pub struct Agent {
    config: AgentConfig,
    session: Arc<SessionManager>,
    controller: Arc<DeliveryController>,
    binder: Arc<TraceSessionBinder>,
    propagation: TracePropagation,
    resource: Vec<KeyValue>,
    builtins: Vec<Arc<SpanHookInstrumentation>>,
    extra_instrumentations: Vec<Arc<dyn Instrumentation>>,
    recorder: Option<Arc<dyn Recorder>>,
    exporter_endpoint: RwLock<String>,
    started: AtomicBool,
    running: Mutex<Option<Running>>,
}

impl Agent {
    pub fn new(config: AgentConfig) -> Result<Self, AgentError> {
        Self::with_collaborators(config, Collaborators::default())
    }

    pub fn with_collaborators(config: AgentConfig, collaborators: Collaborators) -> Result<Self, AgentError> {
        config.validate()?;
        let project_id = config.project_id()?.to_string();

        if config.debug {
            init_logging(&LoggingConfig::default().with_debug(true));
        }

        let session = Arc::new(SessionManager::new(
            collaborators.store,
            Arc::clone(&collaborators.clock),
            SessionConfig {
                timeout: config.session.timeout(),
                activity_persist_interval: config.session.activity_persist_interval(),
            },
        ));
        let identity = session.current_identity();

        let (transport, beacon) = match collaborators.transport {
            Some(transport) => (transport, collaborators.beacon),
            None => {
                let http = Arc::new(HttpTransport::new(config.delivery.request_timeout())?);
                let beacon = collaborators
                    .beacon
                    .unwrap_or_else(|| Arc::clone(&http) as Arc<dyn BeaconTransport>);
                (http as Arc<dyn ReplayTransport>, Some(beacon))
            }
        };

        let buffer = Arc::new(EventBuffer::new(BufferLimits {
            max_event_batch: config.delivery.max_event_batch,
            max_retry_events: config.delivery.max_retry_events,
        }));
        let mut controller = DeliveryController::new(
            buffer,
            transport,
            ReplayEndpoint::new(config.replay_events_base_url(), project_id.as_str()),
            identity.session_id,
            collaborators.clock,
        );
        if let Some(beacon) = beacon {
            controller = controller.with_beacon(beacon);
        }
        let controller = Arc::new(controller);
        let binder = Arc::new(TraceSessionBinder::new(&identity, config.user.clone()));

        // The controller must flush the expiring session before anyone else
        // sees the new id.
        session.subscribe(controller.clone());
        session.subscribe(binder.clone());

        let propagation = TracePropagation::from_config(&config)?;
        let resource = resource_attributes(&config)?;
        let builtins = SpanHookInstrumentation::builtins(collaborators.hooks);

        info!(
            project_id = %project_id,
            session_id = %identity.session_id,
            tab_id = %identity.tab_id,
            replay_url = %controller.endpoint_url(),
            exporter_endpoint = %config.exporter_endpoint(),
            service_name = %config.service_name,
            "monoscope agent created"
        );

        Ok(Self {
            exporter_endpoint: RwLock::new(config.exporter_endpoint().to_string()),
            config,
            session,
            controller,
            binder,
            propagation,
            resource,
            builtins,
            extra_instrumentations: collaborators.instrumentations,
            recorder: collaborators.recorder,
            started: AtomicBool::new(false),
            running: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn session_id(&self) -> SessionId {
        self.session.session_id()
    }

    pub fn tab_id(&self) -> TabId {
        self.session.tab_id()
    }

    pub fn session_state(&self) -> SessionState {
        self.session.state()
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn set_user(&self, user: MonoscopeUser) {
        self.binder.set_user(user);
    }

    pub fn user(&self) -> MonoscopeUser {
        self.binder.user()
    }

    pub fn exporter_endpoint(&self) -> String {
        self.exporter_endpoint.read().clone()
    }

    pub fn set_exporter_endpoint(&self, endpoint: impl Into<String>) {
        let endpoint = endpoint.into();
        debug!(endpoint = %endpoint, "exporter endpoint updated");
        *self.exporter_endpoint.write() = endpoint;
    }

    pub fn set_replay_events_base_url(&self, base_url: impl Into<String>) {
        self.controller.set_replay_base_url(base_url);
    }

    pub fn replay_endpoint(&self) -> String {
        self.controller.endpoint_url()
    }

    /// Start background delivery, hook the instrumentations and start the
    /// recorder. A second call is a no-op.
    pub fn start(&self) -> Result<(), AgentError> {
        if self.started.swap(true, Ordering::AcqRel) {
            warn!("agent already started; ignoring");
            return Ok(());
        }
        if tokio::runtime::Handle::try_current().is_err() {
            self.started.store(false, Ordering::Release);
            return Err(AgentError::NoRuntime);
        }

        let cancel = CancellationToken::new();
        let worker = self
            .controller
            .spawn_worker(self.config.delivery.flush_interval(), cancel.clone());

        let recording = match &self.recorder {
            Some(recorder) => {
                let sink = RecorderSink::new(Arc::clone(&self.controller));
                match recorder.start(sink, &self.config.recording) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        cancel.cancel();
                        self.started.store(false, Ordering::Release);
                        warn!(error = %e, "recorder failed to start");
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        register_instrumentations(&self.instrumentations(), self.attribute_callback());

        *self.running.lock() = Some(Running {
            cancel,
            worker,
            recording,
        });
        info!(session_id = %self.session_id(), "monoscope agent started");
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Feed one recorder event into the replay buffer.
    pub fn record_event(&self, event: TelemetryEvent) -> PushOutcome {
        self.controller.push(event)
    }

    pub fn on_interaction(&self, kind: InteractionKind) {
        debug!(?kind, "interaction");
        self.session.record_activity();
    }

    /// Hidden flushes what is buffered. Visible rotates an expired session
    /// and then counts as activity.
    pub async fn on_visibility_change(&self, visibility: Visibility) {
        match visibility {
            Visibility::Hidden => {
                let outcome = self.controller.flush(FlushMode::Normal).await;
                debug!(?outcome, "flushed on hidden");
            }
            Visibility::Visible => {
                self.session.check_and_rotate_if_expired().await;
                self.session.record_activity();
            }
        }
    }

    /// Page teardown: one-way delivery of everything buffered.
    pub async fn on_page_hide(&self) -> FlushOutcome {
        self.controller.flush(FlushMode::Forced).await
    }

    pub async fn flush(&self) -> FlushOutcome {
        self.controller.flush(FlushMode::Normal).await
    }

    /// Events not yet delivered, including those held for a rotated-out
    /// session.
    pub fn buffered_events(&self) -> usize {
        self.controller.pending_events()
    }

    pub fn delivery_stats(&self) -> DeliveryStats {
        self.controller.stats()
    }

    /// Stop recording and the delivery worker, then make a last awaited
    /// delivery attempt. A shut down agent is not restarted.
    pub async fn shutdown(&self) -> FlushOutcome {
        let running = self.running.lock().take();
        if let Some(running) = running {
            if let Some(recording) = running.recording {
                recording.stop();
            }
            running.cancel.cancel();
            if let Err(e) = running.worker.await {
                warn!(error = %e, "delivery worker ended abnormally");
            }
        }
        let outcome = self.controller.flush(FlushMode::Normal).await;
        info!(?outcome, stats = ?self.controller.stats(), "monoscope agent shut down");
        outcome
    }

    /// Stamp session and user attributes on a span.
    pub fn decorate_span(&self, span: &mut dyn SpanAttributes) {
        self.binder.decorate(span);
    }

    pub fn decorate_otel_span<S: opentelemetry::trace::Span>(&self, span: &mut S) {
        self.binder.decorate(&mut OtelSpan(span));
    }

    pub fn span_attributes(&self) -> Vec<KeyValue> {
        self.binder.attributes()
    }

    /// Resource attributes for the tracer provider: service name, project id
    /// and the configured extras.
    pub fn resource_attributes(&self) -> &[KeyValue] {
        &self.resource
    }

    pub fn should_propagate_trace_header(&self, url: &str) -> bool {
        self.propagation.should_propagate(url)
    }

    /// A built-in instrumentation by name (`document-load`, `fetch`,
    /// `xml-http-request`).
    pub fn builtin_instrumentation(&self, name: &str) -> Option<Arc<SpanHookInstrumentation>> {
        self.builtins.iter().find(|i| i.name() == name).cloned()
    }

    /// Host-supplied instrumentations first, then the built-ins.
    pub fn instrumentations(&self) -> Vec<Arc<dyn Instrumentation>> {
        self.extra_instrumentations
            .iter()
            .cloned()
            .chain(self.builtins.iter().map(|b| Arc::clone(b) as Arc<dyn Instrumentation>))
            .collect()
    }

    fn attribute_callback(&self) -> AttributeCallback {
        let binder = Arc::clone(&self.binder);
        Arc::new(move |span: &mut dyn SpanAttributes| binder.decorate(span))
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if let Some(running) = self.running.get_mut().take() {
            running.cancel.cancel();
        }
    }
}
