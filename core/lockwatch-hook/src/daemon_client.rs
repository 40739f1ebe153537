//! Client helper for forwarding acquisition events to the lockwatch daemon.
//!
//! The daemon is the only writer. Failures are surfaced to the caller; there is
//! no local fallback store.

use lockwatch_protocol::{
    DeviceEventEnvelope, Method, PowerEnvelope, Request, Response, UiEventEnvelope,
    MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use chrono::Utc;
use rand::RngCore;
use serde::Serialize;
use serde_json::Value;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

const ENABLE_ENV: &str = "LOCKWATCH_DAEMON_ENABLED";
const SOCKET_ENV: &str = "LOCKWATCH_DAEMON_SOCKET";
const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_MS: u64 = 600;
const WRITE_TIMEOUT_MS: u64 = 600;
const RETRY_DELAY_MS: u64 = 50;

pub fn send_ui_event(envelope: &UiEventEnvelope) -> Result<Value, String> {
    send_with_retry(Method::UiEvent, &envelope.event_id, envelope, "ui event")
}

pub fn send_power(envelope: &PowerEnvelope) -> Result<Value, String> {
    send_with_retry(Method::Power, &envelope.event_id, envelope, "power action")
}

pub fn send_device_event(envelope: &DeviceEventEnvelope) -> Result<Value, String> {
    send_with_retry(
        Method::DeviceEvent,
        &envelope.event_id,
        envelope,
        "device event",
    )
}

/// Read-only query. Not retried: the caller can simply ask again.
pub fn query(method: Method, params: Option<Value>) -> Result<Value, String> {
    ensure_enabled()?;
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some(make_event_id("qry")),
        params,
    };
    into_data(send_request(&request)?)
}

pub fn daemon_enabled() -> bool {
    match env::var(ENABLE_ENV) {
        Ok(value) => matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"),
        Err(_) => true,
    }
}

pub fn make_event_id(prefix: &str) -> String {
    let mut random = rand::thread_rng();
    format!(
        "{}-{}-{:x}",
        prefix,
        Utc::now().timestamp_millis(),
        random.next_u64()
    )
}

fn ensure_enabled() -> Result<(), String> {
    if daemon_enabled() {
        Ok(())
    } else {
        Err("Daemon disabled".to_string())
    }
}

fn socket_path() -> Result<PathBuf, String> {
    if let Ok(path) = env::var(SOCKET_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir().ok_or_else(|| "Home directory not found".to_string())?;
    Ok(home.join(".lockwatch").join(SOCKET_NAME))
}

// The retry reuses the same request and event id. The daemon answers a
// resend it already applied with the first outcome.
fn send_with_retry<T: Serialize>(
    method: Method,
    event_id: &str,
    envelope: &T,
    label: &str,
) -> Result<Value, String> {
    ensure_enabled()?;
    let params = serde_json::to_value(envelope)
        .map_err(|err| format!("Failed to serialize {}: {}", label, err))?;
    let request = Request {
        protocol_version: PROTOCOL_VERSION,
        method,
        id: Some(event_id.to_string()),
        params: Some(params),
    };

    match send_request(&request).and_then(into_data) {
        Ok(data) => Ok(data),
        Err(err) => {
            tracing::warn!(error = %err, "Failed to send {} to daemon", label);
            std::thread::sleep(Duration::from_millis(RETRY_DELAY_MS));
            send_request(&request).and_then(into_data).map_err(|retry_err| {
                tracing::warn!(
                    error = %retry_err,
                    "Retry failed sending {} to daemon",
                    label
                );
                retry_err
            })
        }
    }
}

fn into_data(response: Response) -> Result<Value, String> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(response
            .error
            .map(|err| format!("{}: {}", err.code, err.message))
            .unwrap_or_else(|| "Unknown daemon error".to_string()))
    }
}

fn send_request(request: &Request) -> Result<Response, String> {
    let socket = socket_path()?;
    let mut stream = UnixStream::connect(&socket)
        .map_err(|err| format!("Failed to connect to daemon socket: {}", err))?;
    let _ = stream.set_read_timeout(Some(Duration::from_millis(READ_TIMEOUT_MS)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(WRITE_TIMEOUT_MS)));

    serde_json::to_writer(&mut stream, request)
        .map_err(|err| format!("Failed to write request: {}", err))?;
    stream
        .write_all(b"\n")
        .map_err(|err| format!("Failed to flush request: {}", err))?;
    stream.flush().ok();

    read_response(&mut stream)
}

fn read_response(stream: &mut UnixStream) -> Result<Response, String> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err("Response exceeded maximum size".to_string());
                }
                if chunk[..n].contains(&b'\n') {
                    break;
                }
            }
            Err(err)
                if matches!(
                    err.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                return Err("Timed out waiting for daemon response".to_string());
            }
            Err(err) => return Err(format!("Failed to read response: {}", err)),
        }
    }

    let response_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => &buffer[..index],
        None => buffer.as_slice(),
    };

    if response_bytes.is_empty() {
        return Err("Daemon response was empty".to_string());
    }

    serde_json::from_slice(response_bytes)
        .map_err(|err| format!("Failed to parse response JSON: {}", err))
}
