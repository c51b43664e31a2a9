//! Replay delivery: drains the event buffer to the collector on any trigger
//! (batch threshold, periodic tick, tab hidden, page teardown) and puts a
//! failed attempt's events back for the next one. Events always ship under
//! the session they were recorded in, even when an upload fails across a
//! rotation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use monoscope_core::{Clock, SessionId, SessionIdentity, TelemetryEvent};
use monoscope_session::SessionObserver;
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::buffer::{EventBuffer, PushOutcome};
use crate::payload::{ReplayEndpoint, ReplayPayload};
use crate::transport::{BeaconTransport, ReplayTransport, TransportError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlushMode {
    /// Awaited upload, serialized by the in-flight guard.
    Normal,
    /// Page teardown. Ignores the guard and prefers the beacon.
    Forced,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FlushOutcome {
    /// A normal flush was already in flight.
    Skipped,
    Empty,
    Delivered { events: usize },
    /// Handed to the beacon; delivery is unconfirmed.
    Beaconed { events: usize },
    /// Upload failed and the events went back into the buffer.
    Requeued { events: usize, error: TransportError },
}

/// Point-in-time copy of the delivery counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub attempts: u64,
    pub delivered_events: u64,
    pub failed_attempts: u64,
    pub beacons: u64,
    pub evicted_events: u64,
}

#[derive(Default)]
struct Counters {
    attempts: AtomicU64,
    delivered_events: AtomicU64,
    failed_attempts: AtomicU64,
    beacons: AtomicU64,
    evicted_events: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DeliveryStats {
        DeliveryStats {
            attempts: self.attempts.load(Ordering::Relaxed),
            delivered_events: self.delivered_events.load(Ordering::Relaxed),
            failed_attempts: self.failed_attempts.load(Ordering::Relaxed),
            beacons: self.beacons.load(Ordering::Relaxed),
            evicted_events: self.evicted_events.load(Ordering::Relaxed),
        }
    }
}

/// Clears the in-flight flag when a normal flush ends, however it ends.
struct SavingGuard<'a>(&'a AtomicBool);

impl<'a> SavingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for SavingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Events bound to the session they were recorded under.
struct PendingBatch {
    session_id: SessionId,
    events: Vec<TelemetryEvent>,
}

pub struct DeliveryController {
    buffer: Arc<EventBuffer>,
    /// Undelivered batches of sessions that have since rotated away, oldest first.
    stranded: Mutex<VecDeque<PendingBatch>>,
    transport: Arc<dyn ReplayTransport>,
    beacon: Option<Arc<dyn BeaconTransport>>,
    endpoint: RwLock<ReplayEndpoint>,
    session_id: RwLock<SessionId>,
    clock: Arc<dyn Clock>,
    saving: AtomicBool,
    flush_requested: Notify,
    counters: Counters,
}

impl DeliveryController {
    pub fn new(
        buffer: Arc<EventBuffer>,
        transport: Arc<dyn ReplayTransport>,
        endpoint: ReplayEndpoint,
        session_id: SessionId,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            buffer,
            stranded: Mutex::new(VecDeque::new()),
            transport,
            beacon: None,
            endpoint: RwLock::new(endpoint),
            session_id: RwLock::new(session_id),
            clock,
            saving: AtomicBool::new(false),
            flush_requested: Notify::new(),
            counters: Counters::default(),
        }
    }

    /// Use `beacon` for forced flushes.
    pub fn with_beacon(mut self, beacon: Arc<dyn BeaconTransport>) -> Self {
        self.beacon = Some(beacon);
        self
    }

    pub fn buffer(&self) -> &Arc<EventBuffer> {
        &self.buffer
    }

    /// Buffer an event, waking the worker once the batch threshold is hit.
    pub fn push(&self, event: TelemetryEvent) -> PushOutcome {
        let outcome = self.buffer.push(event);
        if outcome == PushOutcome::FlushRequested {
            self.request_flush();
        }
        outcome
    }

    /// Ask the worker for a flush. Requests made while one is pending coalesce.
    pub fn request_flush(&self) {
        self.flush_requested.notify_one();
    }

    pub fn session_id(&self) -> SessionId {
        *self.session_id.read()
    }

    /// Label new events with `session_id`. Whatever is still buffered stays
    /// bound to the previous id and ships under it on the next flush.
    pub fn set_session_id(&self, session_id: SessionId) {
        let mut current = self.session_id.write();
        if *current == session_id {
            return;
        }
        let leftover = self.buffer.drain_all();
        if !leftover.is_empty() {
            debug!(
                session_id = %*current,
                events = leftover.len(),
                "holding undelivered events of the previous session"
            );
            let mut stranded = self.stranded.lock();
            stranded.push_back(PendingBatch {
                session_id: *current,
                events: leftover,
            });
            self.trim_stranded(&mut stranded);
        }
        *current = session_id;
    }

    pub fn set_replay_base_url(&self, base_url: impl Into<String>) {
        let mut endpoint = self.endpoint.write();
        endpoint.set_base_url(base_url);
        debug!(url = %endpoint.url(), "replay endpoint updated");
    }

    pub fn endpoint_url(&self) -> String {
        self.endpoint.read().url()
    }

    pub fn is_saving(&self) -> bool {
        self.saving.load(Ordering::Acquire)
    }

    /// Events waiting for delivery: the live buffer plus batches held for
    /// earlier sessions.
    pub fn pending_events(&self) -> usize {
        let stranded: usize = self.stranded.lock().iter().map(|b| b.events.len()).sum();
        self.buffer.len() + stranded
    }

    pub fn stats(&self) -> DeliveryStats {
        let mut stats = self.counters.snapshot();
        stats.evicted_events += self.buffer.evicted_total();
        stats
    }

    /// Deliver batches held for earlier sessions, each under its own id,
    /// then the live buffer under the current one. Returns the outcome of
    /// the last batch attempted; a failed batch ends the flush.
    pub async fn flush(&self, mode: FlushMode) -> FlushOutcome {
        let _guard = match mode {
            FlushMode::Normal => match SavingGuard::acquire(&self.saving) {
                Some(guard) => Some(guard),
                None => {
                    trace!("flush already in flight");
                    return FlushOutcome::Skipped;
                }
            },
            FlushMode::Forced => None,
        };

        let mut outcome = FlushOutcome::Empty;
        while let Some(batch) = self.take_stranded() {
            outcome = self.deliver(mode, batch).await;
            if matches!(outcome, FlushOutcome::Requeued { .. }) {
                return outcome;
            }
        }

        let batch = self.take_current();
        if batch.events.is_empty() {
            return outcome;
        }
        self.deliver(mode, batch).await
    }

    fn take_stranded(&self) -> Option<PendingBatch> {
        self.stranded.lock().pop_front()
    }

    /// Drain the live buffer together with the id it was recorded under.
    fn take_current(&self) -> PendingBatch {
        let session_id = self.session_id.read();
        self.buffer.evict_if_needed();
        PendingBatch {
            session_id: *session_id,
            events: self.buffer.drain_all(),
        }
    }

    async fn deliver(&self, mode: FlushMode, batch: PendingBatch) -> FlushOutcome {
        let session_id = batch.session_id;
        let payload = ReplayPayload::new(batch.events, session_id, self.clock.now());
        let count = payload.event_count;
        let url = self.endpoint_url();
        self.counters.attempts.fetch_add(1, Ordering::Relaxed);

        if mode == FlushMode::Forced {
            if let Some(beacon) = &self.beacon {
                match beacon.send_beacon(&url, &payload) {
                    Ok(()) => {
                        self.counters.beacons.fetch_add(1, Ordering::Relaxed);
                        debug!(session_id = %session_id, events = count, "replay events beaconed");
                        return FlushOutcome::Beaconed { events: count };
                    }
                    Err(e) => {
                        debug!(error = %e, "beacon refused, falling back to request");
                    }
                }
            }
        }

        match self.transport.send(&url, &payload).await {
            Ok(()) => {
                self.counters
                    .delivered_events
                    .fetch_add(count as u64, Ordering::Relaxed);
                debug!(session_id = %session_id, events = count, "replay events delivered");
                FlushOutcome::Delivered { events: count }
            }
            Err(error) => {
                self.counters.failed_attempts.fetch_add(1, Ordering::Relaxed);
                let evicted = self.requeue(PendingBatch {
                    session_id,
                    events: payload.events,
                });
                warn!(
                    session_id = %session_id,
                    events = count,
                    evicted,
                    error_kind = error.error_kind(),
                    error = %error,
                    "replay upload failed, events requeued"
                );
                FlushOutcome::Requeued { events: count, error }
            }
        }
    }

    /// Put a failed batch back in front of newer events of the same
    /// session, or hold it aside if its session rotated away meanwhile.
    /// Returns the number of events dropped to stay within capacity.
    fn requeue(&self, batch: PendingBatch) -> usize {
        let current = self.session_id.read();
        if *current == batch.session_id {
            return self.buffer.merge_back(batch.events);
        }
        let mut stranded = self.stranded.lock();
        stranded.push_front(batch);
        self.trim_stranded(&mut stranded)
    }

    /// Held batches share the buffer's capacity. Whole sessions are
    /// dropped oldest first, always keeping the newest one.
    fn trim_stranded(&self, stranded: &mut VecDeque<PendingBatch>) -> usize {
        let capacity = self.buffer.limits().max_retry_events;
        let mut held: usize = stranded.iter().map(|b| b.events.len()).sum();
        let mut dropped = 0;
        while held > capacity && stranded.len() > 1 {
            let Some(oldest) = stranded.pop_front() else {
                break;
            };
            held -= oldest.events.len();
            dropped += oldest.events.len();
            warn!(
                session_id = %oldest.session_id,
                events = oldest.events.len(),
                "dropping undelivered events of an earlier session"
            );
        }
        if dropped > 0 {
            self.counters
                .evicted_events
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
        dropped
    }

    /// Run the periodic flush loop until `cancel` fires. Explicit requests
    /// (`request_flush`, batch threshold) wake it early.
    pub fn spawn_worker(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // first tick is immediate

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = controller.flush_requested.notified() => {}
                    _ = ticker.tick() => {}
                }
                let outcome = controller.flush(FlushMode::Normal).await;
                trace!(?outcome, "worker flush");
            }
            info!("replay delivery worker stopped");
        })
    }
}

#[async_trait]
impl SessionObserver for DeliveryController {
    async fn session_expiring(&self, expiring: &SessionIdentity) {
        let outcome = self.flush(FlushMode::Forced).await;
        debug!(session_id = %expiring.session_id, ?outcome, "flushed expiring session");
    }

    fn session_rotated(&self, _previous: &SessionIdentity, current: &SessionIdentity) {
        self.set_session_id(current.session_id);
    }
}
