//! Envelope construction for events forwarded by the acquisition layer.
//!
//! Callers may omit `event_id` and `recorded_at`; the hook stamps them at the
//! moment it is invoked. Envelopes are validated locally with the same rules
//! the daemon applies, so malformed input fails before touching the socket.

use chrono::{DateTime, Utc};
use lockwatch_protocol::{
    DeviceEventEnvelope, PowerEnvelope, UiEventEnvelope, UiEventType, UiNode,
};
use serde::Deserialize;
use std::io::{self, Read};

use crate::daemon_client::make_event_id;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UiEventInput {
    #[serde(default)]
    pub event_id: Option<String>,
    #[serde(default)]
    pub recorded_at: Option<String>,
    pub event_type: UiEventType,
    #[serde(default)]
    pub content_description: Option<String>,
    #[serde(default)]
    pub text: Vec<String>,
    #[serde(default)]
    pub windows: Option<Vec<UiNode>>,
    #[serde(default)]
    pub keyguard_locked: Option<bool>,
}

impl UiEventInput {
    pub fn into_envelope(self, now: DateTime<Utc>) -> Result<UiEventEnvelope, String> {
        let envelope = UiEventEnvelope {
            event_id: self.event_id.unwrap_or_else(|| make_event_id("ui")),
            recorded_at: self.recorded_at.unwrap_or_else(|| now.to_rfc3339()),
            event_type: self.event_type,
            content_description: self.content_description,
            text: self.text,
            windows: self.windows,
            keyguard_locked: self.keyguard_locked,
        };
        envelope
            .validate()
            .map_err(|err| format!("{}: {}", err.code, err.message))?;
        Ok(envelope)
    }
}

pub fn read_ui_event_input() -> Result<UiEventInput, String> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .map_err(|e| format!("Failed to read stdin: {}", e))?;
    parse_ui_event_input(&input)
}

pub fn parse_ui_event_input(input: &str) -> Result<UiEventInput, String> {
    if input.trim().is_empty() {
        return Err("UI event input was empty".to_string());
    }
    serde_json::from_str(input).map_err(|e| format!("Failed to parse UI event input: {}", e))
}

pub fn power_envelope(action: &str, now: DateTime<Utc>) -> Result<PowerEnvelope, String> {
    let envelope = PowerEnvelope {
        event_id: make_event_id("pwr"),
        recorded_at: now.to_rfc3339(),
        action: action.to_string(),
    };
    envelope
        .validate()
        .map_err(|err| format!("{}: {}", err.code, err.message))?;
    Ok(envelope)
}

pub fn device_event_envelope(
    action: &str,
    now: DateTime<Utc>,
) -> Result<DeviceEventEnvelope, String> {
    let envelope = DeviceEventEnvelope {
        event_id: make_event_id("dev"),
        recorded_at: now.to_rfc3339(),
        action: action.to_string(),
    };
    envelope
        .validate()
        .map_err(|err| format!("{}: {}", err.code, err.message))?;
    Ok(envelope)
}
