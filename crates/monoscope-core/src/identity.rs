use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SessionId, TabId};

/// The identity every span and replay upload is tagged with.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    pub session_id: SessionId,
    pub tab_id: TabId,
    pub last_activity_at: DateTime<Utc>,
}

impl SessionIdentity {
    /// Time since the last recorded activity, zero if `now` is behind it.
    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        (now - self.last_activity_at).max(chrono::Duration::zero())
    }

    /// Advance the activity mark. Never moves it backwards.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
    }
}
