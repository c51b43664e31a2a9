use async_trait::async_trait;
use monoscope_core::SessionIdentity;

/// Receives session rotation notifications.
///
/// `session_expiring` is awaited before the new id is minted, so anything
/// that must still go out under the old id (buffered replay events) is
/// handled there. `session_rotated` fires once the new id is persisted.
#[async_trait]
pub trait SessionObserver: Send + Sync {
    async fn session_expiring(&self, _expiring: &SessionIdentity) {}

    fn session_rotated(&self, _previous: &SessionIdentity, _current: &SessionIdentity) {}
}
