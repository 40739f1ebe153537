//! One-shot boot / shutdown recording.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::error::Result;
use crate::store::SessionStore;
use crate::types::{DeviceEvent, DeviceEventType};
use crate::watcher::normalize_action;

pub fn device_event_type_for_action(action: &str) -> Option<DeviceEventType> {
    match normalize_action(action).as_str() {
        "boot_completed" | "quickboot_poweron" => Some(DeviceEventType::Boot),
        "shutdown" => Some(DeviceEventType::Shutdown),
        _ => None,
    }
}

/// Records a boot or shutdown. Unrelated actions are ignored (`Ok(None)`).
pub fn record_device_action(
    store: &dyn SessionStore,
    action: &str,
    at: DateTime<Utc>,
) -> Result<Option<DeviceEvent>> {
    let event_type = match device_event_type_for_action(action) {
        Some(event_type) => event_type,
        None => {
            debug!(action, "Ignoring device action");
            return Ok(None);
        }
    };

    let event = store.insert_device_event(event_type, at)?;
    info!(event_type = event_type.as_str(), timestamp = %at.to_rfc3339(), "Device event recorded");
    Ok(Some(event))
}
