//! Bounded, order-preserving replay event buffer.
//!
//! Events are appended as the recorder emits them and drained whole by the
//! delivery controller. When the buffer grows past `max_retry_events` (usually
//! because uploads keep failing and events are merged back), incremental
//! events are dropped oldest-first while every snapshot is kept: a replay
//! missing deltas is degraded, a replay missing its checkpoint is undecodable.

use monoscope_core::constants::{MAX_EVENT_BATCH, MAX_RETRY_EVENTS};
use std::sync::atomic::{AtomicU64, Ordering};

use monoscope_core::TelemetryEvent;
use parking_lot::Mutex;
use tracing::debug;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferLimits {
    /// Length at which a push asks for an immediate flush.
    pub max_event_batch: usize,
    /// Capacity enforced by eviction.
    pub max_retry_events: usize,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            max_event_batch: MAX_EVENT_BATCH,
            max_retry_events: MAX_RETRY_EVENTS,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PushOutcome {
    Buffered,
    /// The batch threshold was reached.
    FlushRequested,
}

pub struct EventBuffer {
    events: Mutex<Vec<TelemetryEvent>>,
    limits: BufferLimits,
    evicted: AtomicU64,
}

impl EventBuffer {
    pub fn new(limits: BufferLimits) -> Self {
        Self {
            events: Mutex::new(Vec::with_capacity(limits.max_event_batch)),
            limits,
            evicted: AtomicU64::new(0),
        }
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Append at the tail. Always accepted; capacity is restored by eviction.
    pub fn push(&self, event: TelemetryEvent) -> PushOutcome {
        let mut events = self.events.lock();
        events.push(event);
        let reached = events.len() >= self.limits.max_event_batch;
        let evicted = self.evict_locked(&mut events);
        if evicted > 0 {
            debug!(evicted, kept = events.len(), "buffer over capacity on push");
        }
        if reached {
            PushOutcome::FlushRequested
        } else {
            PushOutcome::Buffered
        }
    }

    /// Take everything, leaving the buffer empty.
    pub fn drain_all(&self) -> Vec<TelemetryEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    /// Put a failed attempt's events back in front of whatever arrived since.
    pub fn merge_back(&self, mut failed: Vec<TelemetryEvent>) -> usize {
        let mut events = self.events.lock();
        failed.append(&mut events);
        *events = failed;
        let evicted = self.evict_locked(&mut events);
        if evicted > 0 {
            debug!(evicted, kept = events.len(), "buffer over capacity after merge-back");
        }
        evicted
    }

    /// Apply the capacity policy now. Returns the number of evicted events.
    pub fn evict_if_needed(&self) -> usize {
        self.evict_locked(&mut self.events.lock())
    }

    /// Events dropped by eviction over the buffer's lifetime, whichever
    /// operation triggered it.
    pub fn evicted_total(&self) -> u64 {
        self.evicted.load(Ordering::Relaxed)
    }

    fn evict_locked(&self, events: &mut Vec<TelemetryEvent>) -> usize {
        let evicted = evict(events, self.limits.max_retry_events);
        if evicted > 0 {
            self.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn snapshot_count(&self) -> usize {
        self.events.lock().iter().filter(|e| e.is_snapshot()).count()
    }

    /// Copy of the current contents, oldest first.
    pub fn to_vec(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }
}

impl Default for EventBuffer {
    fn default() -> Self {
        Self::new(BufferLimits::default())
    }
}

/// Keep every snapshot and the newest incrementals that still fit, then
/// restore timestamp order. Snapshots alone may exceed `capacity`.
fn evict(events: &mut Vec<TelemetryEvent>, capacity: usize) -> usize {
    let before = events.len();
    if before <= capacity {
        return 0;
    }

    let snapshots = events.iter().filter(|e| e.is_snapshot()).count();
    let incrementals = before - snapshots;
    let keep = capacity.saturating_sub(snapshots);
    let mut to_drop = incrementals.saturating_sub(keep);

    events.retain(|e| {
        if e.is_snapshot() || to_drop == 0 {
            true
        } else {
            to_drop -= 1;
            false
        }
    });
    events.sort_by_key(TelemetryEvent::timestamp);

    before - events.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn limits(batch: usize, capacity: usize) -> BufferLimits {
        BufferLimits {
            max_event_batch: batch,
            max_retry_events: capacity,
        }
    }

    fn inc(ts: i64) -> TelemetryEvent {
        TelemetryEvent::incremental(ts, json!({"source": 1, "seq": ts}))
    }

    fn snap(ts: i64) -> TelemetryEvent {
        TelemetryEvent::snapshot(ts, json!({"node": {"id": ts}}))
    }

    #[test]
    fn push_signals_at_threshold() {
        let buffer = EventBuffer::new(limits(3, 100));
        assert_eq!(buffer.push(inc(1)), PushOutcome::Buffered);
        assert_eq!(buffer.push(inc(2)), PushOutcome::Buffered);
        assert_eq!(buffer.push(inc(3)), PushOutcome::FlushRequested);
        assert_eq!(buffer.push(inc(4)), PushOutcome::FlushRequested);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn drain_empties_buffer() {
        let buffer = EventBuffer::new(limits(10, 100));
        buffer.push(inc(1));
        buffer.push(inc(2));
        let drained = buffer.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(buffer.is_empty());
        assert!(buffer.drain_all().is_empty());
    }

    #[test]
    fn drain_then_merge_back_preserves_order() {
        let buffer = EventBuffer::new(limits(1000, 1000));
        // Deliberately out of timestamp order: merge-back must not re-sort.
        let pushed: Vec<TelemetryEvent> = [5, 1, 9, 3, 3, 7].into_iter().map(inc).collect();
        for ev in pushed.clone() {
            buffer.push(ev);
        }
        let drained = buffer.drain_all();
        assert_eq!(buffer.merge_back(drained), 0);
        assert_eq!(buffer.to_vec(), pushed);
    }

    #[test]
    fn merge_back_goes_in_front_of_newer_events() {
        let buffer = EventBuffer::new(limits(100, 100));
        buffer.push(inc(1));
        buffer.push(inc(2));
        let in_flight = buffer.drain_all();
        buffer.push(inc(3));
        buffer.merge_back(in_flight);
        let ts: Vec<i64> = buffer.to_vec().iter().map(TelemetryEvent::timestamp).collect();
        assert_eq!(ts, vec![1, 2, 3]);
    }

    #[test]
    fn eviction_keeps_snapshot_and_newest_incrementals() {
        let buffer = EventBuffer::new(limits(50, 1000));
        let mut pushed = vec![snap(0)];
        pushed.extend((1..=1005).map(inc));
        let drained_before = pushed.len();
        buffer.merge_back(pushed);

        let kept = buffer.to_vec();
        assert_eq!(drained_before, 1006);
        assert_eq!(kept.len(), 1000);
        assert_eq!(buffer.snapshot_count(), 1);
        assert_eq!(kept.iter().filter(|e| !e.is_snapshot()).count(), 999);
        assert!(kept.windows(2).all(|w| w[0].timestamp() <= w[1].timestamp()));
        // oldest incrementals went first
        assert_eq!(kept[0].timestamp(), 0);
        assert_eq!(kept[1].timestamp(), 7);
        assert_eq!(kept.last().map(TelemetryEvent::timestamp), Some(1005));
    }

    #[test]
    fn eviction_on_push_keeps_most_recent_snapshot() {
        let buffer = EventBuffer::new(limits(1000, 10));
        buffer.push(snap(1));
        for ts in 2..30 {
            buffer.push(inc(ts));
        }
        buffer.push(snap(30));
        buffer.push(inc(31));

        let kept = buffer.to_vec();
        assert_eq!(kept.len(), 10);
        assert_eq!(buffer.evicted_total(), 21);
        assert!(kept.iter().any(|e| e.is_snapshot() && e.timestamp() == 30));
        assert!(kept.iter().any(|e| e.is_snapshot() && e.timestamp() == 1));
    }

    #[test]
    fn eviction_resorts_by_timestamp() {
        let buffer = EventBuffer::new(limits(100, 3));
        buffer.merge_back(vec![inc(10), snap(5), inc(20), inc(1), inc(30)]);
        let ts: Vec<i64> = buffer.to_vec().iter().map(TelemetryEvent::timestamp).collect();
        // incrementals are dropped by arrival position (10 and 20 arrived first)
        assert_eq!(ts, vec![1, 5, 30]);
    }

    #[test]
    fn snapshots_alone_may_exceed_capacity() {
        let buffer = EventBuffer::new(limits(100, 2));
        buffer.merge_back(vec![snap(1), inc(2), snap(3), snap(4)]);
        let kept = buffer.to_vec();
        assert_eq!(kept.len(), 3);
        assert!(kept.iter().all(TelemetryEvent::is_snapshot));
    }

    #[test]
    fn evict_if_needed_is_noop_under_capacity() {
        let buffer = EventBuffer::new(limits(100, 5));
        buffer.push(inc(1));
        assert_eq!(buffer.evict_if_needed(), 0);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.evicted_total(), 0);
    }
}
