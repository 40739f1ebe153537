//! Power-state watcher: screen-off locks, user-present unlocks, nothing else.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::lifecycle::LockSessionManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerSignal {
    ScreenOff,
    UserPresent,
}

impl PowerSignal {
    /// Accepts both short names (`screen_off`) and platform intent actions
    /// (`android.intent.action.SCREEN_OFF`).
    pub fn from_action(action: &str) -> Option<Self> {
        match normalize_action(action).as_str() {
            "screen_off" => Some(PowerSignal::ScreenOff),
            "user_present" => Some(PowerSignal::UserPresent),
            _ => None,
        }
    }
}

/// Forwards a power broadcast to the lifecycle manager.
/// Returns the signal acted upon, or `None` if the action was ignored.
pub fn dispatch_power_action(
    manager: &mut LockSessionManager,
    action: &str,
    at: DateTime<Utc>,
) -> Option<PowerSignal> {
    let signal = match PowerSignal::from_action(action) {
        Some(signal) => signal,
        None => {
            debug!(action, "Ignoring power action");
            return None;
        }
    };

    match signal {
        PowerSignal::ScreenOff => manager.on_locked(at),
        PowerSignal::UserPresent => manager.on_unlocked(at),
    }
    Some(signal)
}

/// Lowercases and strips any dotted namespace and `action_` prefix.
pub(crate) fn normalize_action(action: &str) -> String {
    let trimmed = action.trim();
    let tail = trimmed.rsplit('.').next().unwrap_or(trimmed);
    let lowered = tail.to_ascii_lowercase();
    match lowered.strip_prefix("action_") {
        Some(rest) => rest.to_string(),
        None => lowered,
    }
}
