//! Stored record types: lock sessions and device power events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Store-assigned identity of a lock session row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub i64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One interval from device-locked to unlocked (or superseded by a relock).
///
/// While `is_ongoing` is true, `unlock_time` is `None` and `was_successful`
/// is false. A session is closed exactly once and never touched afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockSession {
    pub id: SessionId,
    pub lock_time: DateTime<Utc>,
    pub unlock_time: Option<DateTime<Utc>>,
    /// Total entry attempts, including the final successful one.
    pub attempts: u32,
    pub was_successful: bool,
    pub is_ongoing: bool,
}

impl LockSession {
    /// A freshly locked session. The id is a placeholder until the store assigns one.
    pub fn opened(lock_time: DateTime<Utc>) -> Self {
        Self {
            id: SessionId(0),
            lock_time,
            unlock_time: None,
            attempts: 0,
            was_successful: false,
            is_ongoing: true,
        }
    }

    /// Closed because the device locked again before anyone unlocked it.
    pub fn superseded(self, attempts: u32) -> Self {
        Self {
            attempts,
            is_ongoing: false,
            ..self
        }
    }

    /// Closed by an unlock transition.
    pub fn unlocked(self, unlock_time: DateTime<Utc>, attempts: u32) -> Self {
        Self {
            unlock_time: Some(unlock_time),
            attempts,
            was_successful: true,
            is_ongoing: false,
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEventType {
    Boot,
    Shutdown,
}

impl DeviceEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceEventType::Boot => "boot",
            DeviceEventType::Shutdown => "shutdown",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "boot" => Some(DeviceEventType::Boot),
            "shutdown" => Some(DeviceEventType::Shutdown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    pub id: i64,
    pub event_type: DeviceEventType,
    pub timestamp: DateTime<Utc>,
}
