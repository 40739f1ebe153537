//! Storage seam for lock sessions and device events.
//!
//! The lifecycle manager only talks to this trait. `Db` is the SQLite
//! implementation used by the daemon.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{DeviceEvent, DeviceEventType, LockSession, SessionId};

pub trait SessionStore: Send + Sync {
    /// Inserts a session row and returns its new identity. `session.id` is ignored.
    fn insert_session(&self, session: &LockSession) -> Result<SessionId>;

    /// Overwrites the row with `session.id`. Updating a missing row is a no-op.
    fn update_session(&self, session: &LockSession) -> Result<()>;

    fn get_session(&self, id: SessionId) -> Result<Option<LockSession>>;

    /// Deletes sessions whose lock time is strictly before `cutoff`.
    fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Sessions locked after `since`, newest lock time first.
    fn recent_sessions(&self, since: DateTime<Utc>) -> Result<Vec<LockSession>>;

    fn insert_device_event(
        &self,
        event_type: DeviceEventType,
        timestamp: DateTime<Utc>,
    ) -> Result<DeviceEvent>;

    fn delete_device_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize>;

    /// Device events after `since`, newest first.
    fn recent_device_events(&self, since: DateTime<Utc>) -> Result<Vec<DeviceEvent>>;
}
