use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use monoscope_core::constants::{ACTIVITY_PERSIST_INTERVAL, LAST_ACTIVITY_KEY, SESSION_ID_KEY, SESSION_TIMEOUT};
use monoscope_core::{Clock, SessionId, SessionIdentity, TabId};
use monoscope_store::IdentityStore;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::observer::SessionObserver;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Inactivity after which the session rotates.
    pub timeout: Duration,
    /// Minimum gap between persisted activity writes.
    pub activity_persist_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout: SESSION_TIMEOUT,
            activity_persist_interval: ACTIVITY_PERSIST_INTERVAL,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Transient, between the expiry check and the new id being persisted.
    Rotating,
}

/// How the session id was obtained at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// A stored, unexpired id was picked up.
    Reused,
    /// Nothing usable was stored; a fresh id was minted and persisted.
    Minted,
}

struct Inner {
    identity: SessionIdentity,
    state: SessionState,
    last_persisted_at: Option<DateTime<Utc>>,
}

/// Owns the session/tab identity and decides when it rotates.
pub struct SessionManager {
    inner: Mutex<Inner>,
    observers: RwLock<Vec<Arc<dyn SessionObserver>>>,
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    resolution: Resolution,
}

impl SessionManager {
    /// Resolve identity from the store, minting a new session if the stored
    /// one is missing, malformed or expired. The tab id is always new.
    pub fn new(store: Arc<dyn IdentityStore>, clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        let now = clock.now();
        let tab_id = TabId::new();

        let stored = read_stored(store.as_ref());
        let (identity, resolution) = match stored {
            Some((session_id, last_activity_at))
                if idle(now, last_activity_at) < to_chrono(config.timeout) =>
            {
                let identity = SessionIdentity {
                    session_id,
                    tab_id,
                    last_activity_at: last_activity_at.min(now),
                };
                (identity, Resolution::Reused)
            }
            _ => {
                let identity = SessionIdentity {
                    session_id: SessionId::new(),
                    tab_id,
                    last_activity_at: now,
                };
                (identity, Resolution::Minted)
            }
        };

        let last_persisted_at = match resolution {
            Resolution::Minted => {
                persist(store.as_ref(), &identity);
                Some(now)
            }
            Resolution::Reused => None,
        };

        info!(
            session_id = %identity.session_id,
            tab_id = %identity.tab_id,
            resolution = ?resolution,
            "session resolved"
        );

        Self {
            inner: Mutex::new(Inner {
                identity,
                state: SessionState::Active,
                last_persisted_at,
            }),
            observers: RwLock::new(Vec::new()),
            store,
            clock,
            config,
            resolution,
        }
    }

    pub fn current_identity(&self) -> SessionIdentity {
        self.inner.lock().identity.clone()
    }

    pub fn session_id(&self) -> SessionId {
        self.inner.lock().identity.session_id
    }

    pub fn tab_id(&self) -> TabId {
        self.inner.lock().identity.tab_id
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn is_expired(&self) -> bool {
        let now = self.clock.now();
        self.inner.lock().identity.idle_for(now) >= to_chrono(self.config.timeout)
    }

    /// Register a rotation observer.
    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) {
        self.observers.write().push(observer);
    }

    /// Note user activity. The in-memory mark always advances; the store is
    /// written at most once per persist interval.
    pub fn record_activity(&self) {
        let now = self.clock.now();
        let to_persist = {
            let mut inner = self.inner.lock();
            inner.identity.touch(now);
            let due = inner
                .last_persisted_at
                .map_or(true, |at| idle(now, at) >= to_chrono(self.config.activity_persist_interval));
            if due {
                inner.last_persisted_at = Some(now);
                Some(inner.identity.clone())
            } else {
                None
            }
        };

        if let Some(identity) = to_persist {
            debug!(session_id = %identity.session_id, "activity persisted");
            persist(self.store.as_ref(), &identity);
        }
    }

    /// Rotate the session if it has been idle for at least the timeout.
    ///
    /// Observers' `session_expiring` hooks run to completion under the old
    /// identity before the new id exists. Returns whether a rotation happened;
    /// a second call right after is a no-op.
    pub async fn check_and_rotate_if_expired(&self) -> bool {
        let expiring = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Rotating {
                return false;
            }
            let idle_for = inner.identity.idle_for(self.clock.now());
            if idle_for < to_chrono(self.config.timeout) {
                return false;
            }
            inner.state = SessionState::Rotating;
            info!(
                session_id = %inner.identity.session_id,
                idle_secs = idle_for.num_seconds(),
                "session expired, rotating"
            );
            inner.identity.clone()
        };

        let mut guard = RotationGuard {
            inner: &self.inner,
            committed: false,
        };

        let observers: Vec<Arc<dyn SessionObserver>> = self.observers.read().clone();
        for observer in &observers {
            observer.session_expiring(&expiring).await;
        }

        let now = self.clock.now();
        let current = {
            let mut inner = self.inner.lock();
            inner.identity.session_id = SessionId::new();
            inner.identity.last_activity_at = now;
            inner.last_persisted_at = Some(now);
            inner.state = SessionState::Active;
            inner.identity.clone()
        };
        guard.committed = true;

        persist(self.store.as_ref(), &current);
        info!(
            previous = %expiring.session_id,
            session_id = %current.session_id,
            "session rotated"
        );

        for observer in &observers {
            observer.session_rotated(&expiring, &current);
        }
        true
    }
}

/// Returns the state machine to `Active` if a rotation future is dropped
/// before it commits the new id.
struct RotationGuard<'a> {
    inner: &'a Mutex<Inner>,
    committed: bool,
}

impl Drop for RotationGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            warn!("session rotation abandoned before commit");
            self.inner.lock().state = SessionState::Active;
        }
    }
}

fn read_stored(store: &dyn IdentityStore) -> Option<(SessionId, DateTime<Utc>)> {
    let session = store.get(SESSION_ID_KEY);
    let activity = store.get(LAST_ACTIVITY_KEY);
    match (session, activity) {
        (Ok(Some(session)), Ok(Some(activity))) => {
            let session_id = match session.parse::<SessionId>() {
                Ok(id) => id,
                Err(e) => {
                    warn!(value = %session, error = %e, "stored session id is not a UUID");
                    return None;
                }
            };
            let millis = match activity.trim().parse::<i64>() {
                Ok(ms) => ms,
                Err(e) => {
                    warn!(value = %activity, error = %e, "stored last activity is not epoch millis");
                    return None;
                }
            };
            let at = Utc.timestamp_millis_opt(millis).single()?;
            Some((session_id, at))
        }
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "failed to read session from store");
            None
        }
        _ => None,
    }
}

fn persist(store: &dyn IdentityStore, identity: &SessionIdentity) {
    let result = store
        .set(SESSION_ID_KEY, &identity.session_id.to_string())
        .and_then(|()| store.set(LAST_ACTIVITY_KEY, &identity.last_activity_at.timestamp_millis().to_string()));
    if let Err(e) = result {
        warn!(session_id = %identity.session_id, error = %e, "failed to persist session");
    }
}

fn idle(now: DateTime<Utc>, since: DateTime<Utc>) -> chrono::Duration {
    (now - since).max(chrono::Duration::zero())
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::milliseconds(i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use monoscope_core::ManualClock;
    use monoscope_store::{MemoryIdentityStore, StoreError};

    fn setup() -> (MemoryIdentityStore, Arc<ManualClock>) {
        (MemoryIdentityStore::new(), Arc::new(ManualClock::default()))
    }

    fn manager(store: &MemoryIdentityStore, clock: &Arc<ManualClock>) -> SessionManager {
        SessionManager::new(Arc::new(store.clone()), clock.clone(), SessionConfig::default())
    }

    fn seed(store: &MemoryIdentityStore, id: SessionId, at: DateTime<Utc>) {
        store.set(SESSION_ID_KEY, &id.to_string()).unwrap();
        store
            .set(LAST_ACTIVITY_KEY, &at.timestamp_millis().to_string())
            .unwrap();
    }

    #[test]
    fn fresh_store_mints_and_persists() {
        let (store, clock) = setup();
        let mgr = manager(&store, &clock);
        assert_eq!(mgr.resolution(), Resolution::Minted);
        assert_eq!(
            store.get(SESSION_ID_KEY).unwrap(),
            Some(mgr.session_id().to_string())
        );
        assert_eq!(
            store.get(LAST_ACTIVITY_KEY).unwrap(),
            Some(clock.now().timestamp_millis().to_string())
        );
    }

    #[test]
    fn recent_session_is_reused() {
        let (store, clock) = setup();
        let stored = SessionId::new();
        seed(&store, stored, clock.now() - chrono::Duration::minutes(10));

        let mgr = manager(&store, &clock);
        assert_eq!(mgr.resolution(), Resolution::Reused);
        assert_eq!(mgr.session_id(), stored);
    }

    #[test]
    fn expired_session_is_replaced() {
        let (store, clock) = setup();
        let stored = SessionId::new();
        seed(&store, stored, clock.now() - chrono::Duration::minutes(31));

        let mgr = manager(&store, &clock);
        assert_eq!(mgr.resolution(), Resolution::Minted);
        assert_ne!(mgr.session_id(), stored);
        assert_eq!(
            store.get(SESSION_ID_KEY).unwrap(),
            Some(mgr.session_id().to_string())
        );
    }

    #[test]
    fn malformed_store_values_mint_fresh() {
        let (store, clock) = setup();
        store.set(SESSION_ID_KEY, "definitely-not-a-uuid").unwrap();
        store
            .set(LAST_ACTIVITY_KEY, &clock.now_millis().to_string())
            .unwrap();
        assert_eq!(manager(&store, &clock).resolution(), Resolution::Minted);

        let (store, clock) = setup();
        store.set(SESSION_ID_KEY, &SessionId::new().to_string()).unwrap();
        store.set(LAST_ACTIVITY_KEY, "yesterday").unwrap();
        assert_eq!(manager(&store, &clock).resolution(), Resolution::Minted);
    }

    #[test]
    fn session_id_without_activity_mints_fresh() {
        let (store, clock) = setup();
        let stored = SessionId::new();
        store.set(SESSION_ID_KEY, &stored.to_string()).unwrap();
        let mgr = manager(&store, &clock);
        assert_ne!(mgr.session_id(), stored);
    }

    #[test]
    fn tab_id_is_new_per_instance_and_never_stored() {
        let (store, clock) = setup();
        let a = manager(&store, &clock);
        let b = manager(&store, &clock);
        assert_eq!(a.session_id(), b.session_id());
        assert_ne!(a.tab_id(), b.tab_id());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn activity_persistence_is_throttled() {
        let (store, clock) = setup();
        let mgr = manager(&store, &clock);
        let start = clock.now();

        clock.advance(chrono::Duration::seconds(2));
        mgr.record_activity();
        assert_eq!(mgr.current_identity().last_activity_at, clock.now());
        assert_eq!(
            store.get(LAST_ACTIVITY_KEY).unwrap(),
            Some(start.timestamp_millis().to_string())
        );

        clock.advance(chrono::Duration::seconds(4));
        mgr.record_activity();
        assert_eq!(
            store.get(LAST_ACTIVITY_KEY).unwrap(),
            Some(clock.now().timestamp_millis().to_string())
        );
    }

    #[test]
    fn activity_never_moves_backwards() {
        let (store, clock) = setup();
        let mgr = manager(&store, &clock);
        let before = mgr.current_identity().last_activity_at;
        clock.advance(chrono::Duration::seconds(-30));
        mgr.record_activity();
        assert_eq!(mgr.current_identity().last_activity_at, before);
    }

    #[tokio::test]
    async fn not_expired_is_noop() {
        let (store, clock) = setup();
        let mgr = manager(&store, &clock);
        let before = mgr.session_id();
        clock.advance(chrono::Duration::minutes(29));
        assert!(!mgr.check_and_rotate_if_expired().await);
        assert_eq!(mgr.session_id(), before);
    }

    #[tokio::test]
    async fn rotation_is_idempotent() {
        let (store, clock) = setup();
        let mgr = manager(&store, &clock);
        let original = mgr.session_id();

        clock.advance(chrono::Duration::minutes(30));
        assert!(mgr.is_expired());
        assert!(mgr.check_and_rotate_if_expired().await);
        let rotated = mgr.session_id();
        assert_ne!(rotated, original);
        assert_eq!(mgr.tab_id(), mgr.current_identity().tab_id);

        assert!(!mgr.check_and_rotate_if_expired().await);
        assert_eq!(mgr.session_id(), rotated);
        assert_eq!(mgr.state(), SessionState::Active);
        assert_eq!(store.get(SESSION_ID_KEY).unwrap(), Some(rotated.to_string()));
    }

    #[derive(Default)]
    struct Recorder {
        log: Mutex<Vec<String>>,
        session_seen_during_expiry: Mutex<Option<SessionId>>,
    }

    #[async_trait]
    impl SessionObserver for Recorder {
        async fn session_expiring(&self, expiring: &SessionIdentity) {
            self.log.lock().push(format!("expiring {}", expiring.session_id));
            *self.session_seen_during_expiry.lock() = Some(expiring.session_id);
        }

        fn session_rotated(&self, previous: &SessionIdentity, current: &SessionIdentity) {
            self.log
                .lock()
                .push(format!("rotated {} -> {}", previous.session_id, current.session_id));
        }
    }

    #[tokio::test]
    async fn observers_see_old_then_new() {
        let (store, clock) = setup();
        let mgr = manager(&store, &clock);
        let observer = Arc::new(Recorder::default());
        mgr.subscribe(observer.clone());
        let old = mgr.session_id();

        clock.advance(chrono::Duration::minutes(45));
        assert!(mgr.check_and_rotate_if_expired().await);
        let new = mgr.session_id();

        assert_eq!(*observer.session_seen_during_expiry.lock(), Some(old));
        assert_eq!(
            *observer.log.lock(),
            vec![format!("expiring {old}"), format!("rotated {old} -> {new}")]
        );
    }

    struct FailingStore;

    impl IdentityStore for FailingStore {
        fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("quota".into()))
        }
        fn set(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota".into()))
        }
        fn remove(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("quota".into()))
        }
    }

    #[tokio::test]
    async fn store_failures_degrade_gracefully() {
        let clock = Arc::new(ManualClock::default());
        let mgr = SessionManager::new(Arc::new(FailingStore), clock.clone(), SessionConfig::default());
        assert_eq!(mgr.resolution(), Resolution::Minted);
        mgr.record_activity();
        clock.advance(chrono::Duration::hours(1));
        assert!(mgr.check_and_rotate_if_expired().await);
    }
}
