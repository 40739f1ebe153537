//! IPC protocol types and validation for lockwatch-daemon.
//!
//! This crate is shared by the daemon and its clients to prevent schema drift.
//! The daemon remains the authority on validation, but clients can reuse the
//! same types to construct valid requests.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024; // 1MB
pub const MAX_EVENT_ID_LEN: usize = 128;
/// Deepest window snapshot the daemon will walk.
pub const MAX_TREE_DEPTH: usize = 64;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum Method {
    GetHealth,
    UiEvent,
    Power,
    DeviceEvent,
    GetSessions,
    GetDeviceEvents,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub protocol_version: u32,
    pub method: Method,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Response {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Response {
    pub fn ok(id: Option<String>, data: Value) -> Self {
        Self {
            ok: true,
            id,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(id: Option<String>, code: &str, message: impl Into<String>) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(ErrorInfo::new(code, message)),
        }
    }

    pub fn error_with_info(id: Option<String>, error: ErrorInfo) -> Self {
        Self {
            ok: false,
            id,
            data: None,
            error: Some(error),
        }
    }
}

/// Accessibility event categories forwarded by the acquisition layer.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UiEventType {
    ViewClicked,
    ViewTextChanged,
    WindowContentChanged,
}

/// One node of an interface tree snapshot.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UiNode {
    #[serde(default)]
    pub is_password: bool,
    #[serde(default)]
    pub is_editable: bool,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub children: Vec<UiNode>,
}

impl UiNode {
    pub fn depth(&self) -> usize {
        1 + self.children.iter().map(UiNode::depth).max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct UiEventEnvelope {
    pub event_id: String,
    pub recorded_at: String,
    pub event_type: UiEventType,
    #[serde(default)]
    pub content_description: Option<String>,
    /// Text items attached to the event, in the order the platform reports them.
    #[serde(default)]
    pub text: Vec<String>,
    /// Window roots captured alongside a content change, active window first.
    #[serde(default)]
    pub windows: Option<Vec<UiNode>>,
    #[serde(default)]
    pub keyguard_locked: Option<bool>,
}

impl UiEventEnvelope {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        validate_event_id(&self.event_id)?;
        validate_timestamp(&self.recorded_at)?;

        if let Some(windows) = &self.windows {
            if self.event_type != UiEventType::WindowContentChanged {
                return Err(ErrorInfo::new(
                    "unexpected_field",
                    "windows is only accepted on window_content_changed events",
                ));
            }
            if windows.iter().any(|root| root.depth() > MAX_TREE_DEPTH) {
                return Err(ErrorInfo::new(
                    "tree_too_deep",
                    format!("window snapshots must be {} levels or fewer", MAX_TREE_DEPTH),
                ));
            }
        }

        Ok(())
    }
}

/// Screen power broadcast (screen off / user present / anything else).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PowerEnvelope {
    pub event_id: String,
    pub recorded_at: String,
    pub action: String,
}

impl PowerEnvelope {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        validate_event_id(&self.event_id)?;
        validate_timestamp(&self.recorded_at)?;
        require_string(&self.action, "action")
    }
}

/// Boot / shutdown broadcast.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeviceEventEnvelope {
    pub event_id: String,
    pub recorded_at: String,
    pub action: String,
}

impl DeviceEventEnvelope {
    pub fn validate(&self) -> Result<(), ErrorInfo> {
        validate_event_id(&self.event_id)?;
        validate_timestamp(&self.recorded_at)?;
        require_string(&self.action, "action")
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SinceParams {
    #[serde(default)]
    pub since: Option<String>,
}

pub fn parse_ui_event(params: Value) -> Result<UiEventEnvelope, ErrorInfo> {
    let envelope: UiEventEnvelope = decode(params, "ui event")?;
    envelope.validate()?;
    Ok(envelope)
}

pub fn parse_power(params: Value) -> Result<PowerEnvelope, ErrorInfo> {
    let envelope: PowerEnvelope = decode(params, "power")?;
    envelope.validate()?;
    Ok(envelope)
}

pub fn parse_device_event(params: Value) -> Result<DeviceEventEnvelope, ErrorInfo> {
    let envelope: DeviceEventEnvelope = decode(params, "device event")?;
    envelope.validate()?;
    Ok(envelope)
}

pub fn parse_since(params: Option<Value>) -> Result<Option<DateTime<Utc>>, ErrorInfo> {
    let params = match params {
        Some(params) => params,
        None => return Ok(None),
    };
    let parsed: SinceParams = decode(params, "since")?;
    match parsed.since {
        Some(value) => parse_timestamp(&value)
            .map(Some)
            .ok_or_else(|| ErrorInfo::new("invalid_timestamp", "since must be RFC3339")),
        None => Ok(None),
    }
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn decode<T: serde::de::DeserializeOwned>(params: Value, label: &str) -> Result<T, ErrorInfo> {
    serde_json::from_value(params).map_err(|err| {
        ErrorInfo::new(
            "invalid_params",
            format!("{} payload is invalid JSON: {}", label, err),
        )
    })
}

fn validate_event_id(event_id: &str) -> Result<(), ErrorInfo> {
    if event_id.trim().is_empty() {
        return Err(ErrorInfo::new("invalid_event_id", "event_id is required"));
    }
    if event_id.len() > MAX_EVENT_ID_LEN {
        return Err(ErrorInfo::new(
            "invalid_event_id",
            "event_id must be 128 characters or fewer",
        ));
    }
    Ok(())
}

fn validate_timestamp(recorded_at: &str) -> Result<(), ErrorInfo> {
    if parse_timestamp(recorded_at).is_none() {
        return Err(ErrorInfo::new(
            "invalid_timestamp",
            "recorded_at must be RFC3339",
        ));
    }
    Ok(())
}

fn require_string(value: &str, field: &str) -> Result<(), ErrorInfo> {
    if value.trim().is_empty() {
        return Err(ErrorInfo::new(
            "missing_field",
            format!("{} is required", field),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_ui_event(event_type: UiEventType) -> UiEventEnvelope {
        UiEventEnvelope {
            event_id: "evt-1".to_string(),
            recorded_at: "2026-01-30T12:00:00Z".to_string(),
            event_type,
            content_description: None,
            text: Vec::new(),
            windows: None,
            keyguard_locked: None,
        }
    }

    fn nested(depth: usize) -> UiNode {
        let mut node = UiNode::default();
        for _ in 1..depth {
            node = UiNode {
                children: vec![node],
                ..UiNode::default()
            };
        }
        node
    }

    #[test]
    fn validates_click_event() {
        let mut event = base_ui_event(UiEventType::ViewClicked);
        event.content_description = Some("7".to_string());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn rejects_windows_on_click_event() {
        let mut event = base_ui_event(UiEventType::ViewClicked);
        event.windows = Some(vec![UiNode::default()]);
        let err = event.validate().expect_err("windows on click");
        assert_eq!(err.code, "unexpected_field");
    }

    #[test]
    fn rejects_overly_deep_window_snapshot() {
        let mut event = base_ui_event(UiEventType::WindowContentChanged);
        event.windows = Some(vec![nested(MAX_TREE_DEPTH + 1)]);
        let err = event.validate().expect_err("deep tree");
        assert_eq!(err.code, "tree_too_deep");

        event.windows = Some(vec![nested(MAX_TREE_DEPTH)]);
        assert!(event.validate().is_ok());
    }

    #[test]
    fn rejects_bad_timestamp() {
        let mut event = base_ui_event(UiEventType::ViewTextChanged);
        event.recorded_at = "not-a-time".to_string();
        assert!(event.validate().is_err());
    }

    #[test]
    fn rejects_long_event_id() {
        let mut event = base_ui_event(UiEventType::ViewTextChanged);
        event.event_id = "a".repeat(256);
        assert!(event.validate().is_err());
    }

    #[test]
    fn power_requires_action() {
        let envelope = PowerEnvelope {
            event_id: "evt-2".to_string(),
            recorded_at: "2026-01-30T12:00:00Z".to_string(),
            action: "  ".to_string(),
        };
        let err = envelope.validate().expect_err("blank action");
        assert_eq!(err.code, "missing_field");
    }

    #[test]
    fn parse_ui_event_accepts_snake_case_json() {
        let value = serde_json::json!({
            "event_id": "evt-3",
            "recorded_at": "2026-01-30T12:00:00Z",
            "event_type": "window_content_changed",
            "windows": [{"is_password": true, "text": "••"}]
        });
        let event = parse_ui_event(value).expect("parse");
        assert_eq!(event.event_type, UiEventType::WindowContentChanged);
        assert_eq!(event.windows.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn parse_ui_event_rejects_unknown_fields() {
        let value = serde_json::json!({
            "event_id": "evt-4",
            "recorded_at": "2026-01-30T12:00:00Z",
            "event_type": "view_clicked",
            "surprise": 1
        });
        let err = parse_ui_event(value).expect_err("unknown field");
        assert_eq!(err.code, "invalid_params");
    }

    #[test]
    fn parse_since_handles_missing_and_invalid() {
        assert_eq!(parse_since(None).expect("none"), None);
        let since = parse_since(Some(serde_json::json!({"since": "2026-01-30T12:00:00Z"})))
            .expect("since")
            .expect("some");
        assert_eq!(since.to_rfc3339(), "2026-01-30T12:00:00+00:00");
        let err = parse_since(Some(serde_json::json!({"since": "yesterday"})))
            .expect_err("invalid");
        assert_eq!(err.code, "invalid_timestamp");
    }
}
