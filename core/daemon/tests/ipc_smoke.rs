use chrono::{Duration as ChronoDuration, Utc};
use lockwatch_protocol::{
    DeviceEventEnvelope, Method, PowerEnvelope, Request, Response, UiEventEnvelope, UiEventType,
    PROTOCOL_VERSION,
};
use serde_json::Value;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct DaemonGuard {
    child: Child,
}

impl Drop for DaemonGuard {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_daemon(home: &Path) -> Child {
    Command::new(env!("CARGO_BIN_EXE_lockwatch-daemon"))
        .env("HOME", home)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .expect("Failed to spawn lockwatch-daemon")
}

fn socket_path(home: &Path) -> PathBuf {
    home.join(".lockwatch").join("daemon.sock")
}

fn wait_for_socket(path: &Path, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if path.exists() && UnixStream::connect(path).is_ok() {
            return;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for daemon socket at {}", path.display());
}

fn send_request(socket: &Path, method: Method, id: &str, params: Option<Value>) -> Response {
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some(id.to_string()),
        params,
    };
    let mut stream = UnixStream::connect(socket).expect("Failed to connect to daemon socket");
    serde_json::to_writer(&mut stream, &request).expect("Failed to serialize request");
    stream.write_all(b"\n").expect("Failed to write request");
    stream.flush().ok();
    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Response {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = stream.read(&mut chunk).expect("Failed to read response");
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if chunk[..n].contains(&b'\n') {
            break;
        }
    }

    let response_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    serde_json::from_slice(response_bytes).expect("Failed to parse response JSON")
}

fn power(socket: &Path, action: &str, offset_ms: i64) -> Response {
    let envelope = PowerEnvelope {
        event_id: format!("power-{}", offset_ms),
        recorded_at: (Utc::now() + ChronoDuration::milliseconds(offset_ms)).to_rfc3339(),
        action: action.to_string(),
    };
    send_request(
        socket,
        Method::Power,
        &envelope.event_id,
        Some(serde_json::to_value(&envelope).expect("serialize power")),
    )
}

fn ui_event(
    socket: &Path,
    event_type: UiEventType,
    label: Option<&str>,
    offset_ms: i64,
) -> Response {
    let envelope = UiEventEnvelope {
        event_id: format!("ui-{}", offset_ms),
        recorded_at: (Utc::now() + ChronoDuration::milliseconds(offset_ms)).to_rfc3339(),
        event_type,
        content_description: label.map(str::to_string),
        text: Vec::new(),
        windows: None,
        keyguard_locked: Some(true),
    };
    send_request(
        socket,
        Method::UiEvent,
        &envelope.event_id,
        Some(serde_json::to_value(&envelope).expect("serialize ui event")),
    )
}

fn data_bool(response: &Response, key: &str) -> Option<bool> {
    response
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .and_then(Value::as_bool)
}

fn wait_for_closed_session(socket: &Path, timeout: Duration) -> Value {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        let response = send_request(socket, Method::GetSessions, "sessions", None);
        assert!(response.ok, "get_sessions failed: {:?}", response.error);
        let closed = response
            .data
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|rows| rows.first().cloned())
            .filter(|row| row.get("is_ongoing").and_then(Value::as_bool) == Some(false));
        if let Some(row) = closed {
            return row;
        }
        sleep(Duration::from_millis(25));
    }
    panic!("Timed out waiting for the lock session to close");
}

#[test]
fn daemon_ipc_lock_cycle_smoke() {
    let home = TempDir::new().expect("Failed to create temp HOME");
    let socket = socket_path(home.path());
    let child = spawn_daemon(home.path());
    let _guard = DaemonGuard { child };

    wait_for_socket(&socket, Duration::from_secs(2));

    let health = send_request(&socket, Method::GetHealth, "health-check", None);
    assert!(health.ok, "health response was not ok");
    let status = health
        .data
        .as_ref()
        .and_then(|data| data.get("status"))
        .and_then(Value::as_str)
        .unwrap_or("missing");
    assert_eq!(status, "ok");

    let ignored = ui_event(&socket, UiEventType::ViewClicked, Some("1"), 0);
    assert!(ignored.ok);
    assert_eq!(data_bool(&ignored, "accepted"), Some(false));

    let locked = power(&socket, "android.intent.action.SCREEN_OFF", 0);
    assert_eq!(data_bool(&locked, "accepted"), Some(true));

    for (index, digit) in ["1", "2", "3", "4"].iter().enumerate() {
        let response = ui_event(
            &socket,
            UiEventType::ViewClicked,
            Some(digit),
            100 * (index as i64 + 1),
        );
        assert_eq!(data_bool(&response, "accepted"), Some(true));
    }
    let submitted = ui_event(&socket, UiEventType::ViewClicked, Some("OK"), 500);
    assert_eq!(data_bool(&submitted, "attempt_recorded"), Some(true));

    ui_event(&socket, UiEventType::ViewClicked, Some("5"), 700);
    let unlocked = power(&socket, "android.intent.action.USER_PRESENT", 2_000);
    assert_eq!(data_bool(&unlocked, "accepted"), Some(true));

    let session = wait_for_closed_session(&socket, Duration::from_secs(2));
    assert_eq!(session.get("attempts").and_then(Value::as_u64), Some(2));
    assert_eq!(
        session.get("was_successful").and_then(Value::as_bool),
        Some(true)
    );
    assert!(session.get("unlock_time").is_some_and(|value| !value.is_null()));

    let boot = DeviceEventEnvelope {
        event_id: "device-boot".to_string(),
        recorded_at: Utc::now().to_rfc3339(),
        action: "android.intent.action.BOOT_COMPLETED".to_string(),
    };
    let recorded = send_request(
        &socket,
        Method::DeviceEvent,
        "device-boot",
        Some(serde_json::to_value(&boot).expect("serialize device event")),
    );
    assert_eq!(data_bool(&recorded, "accepted"), Some(true));

    let since = (Utc::now() - ChronoDuration::hours(1)).to_rfc3339();
    let events = send_request(
        &socket,
        Method::GetDeviceEvents,
        "device-events",
        Some(serde_json::json!({ "since": since })),
    );
    assert!(events.ok);
    let rows = events
        .data
        .as_ref()
        .and_then(Value::as_array)
        .expect("device events array");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("event_type").and_then(Value::as_str),
        Some("boot")
    );
}
