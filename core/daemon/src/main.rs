//! Lockwatch daemon entrypoint.
//!
//! A single-writer service that owns the lock-session lifecycle. Acquisition
//! hooks forward power broadcasts and accessibility events over a local
//! socket; the daemon classifies them, tracks attempts, and persists sessions
//! and device events to SQLite.

use chrono::Utc;
use fs_err as fs;
use std::env;
use std::io::{Read, Write};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lockwatch_core::config::lockwatch_dir;
use lockwatch_core::{load_config, Db, LockwatchConfig};
use lockwatch_protocol::{
    parse_device_event, parse_power, parse_since, parse_ui_event, ErrorInfo, Method, Request,
    Response, MAX_REQUEST_BYTES, PROTOCOL_VERSION,
};
use serde::Serialize;
use serde_json::Value;

mod recent_events;
mod state;

use state::SharedState;

const SOCKET_NAME: &str = "daemon.sock";
const READ_TIMEOUT_SECS: u64 = 2;
const READ_CHUNK_SIZE: usize = 4096;

fn main() {
    init_logging();

    let socket_path = match daemon_socket_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon socket path");
            std::process::exit(1);
        }
    };

    if let Err(err) = prepare_socket_dir(&socket_path) {
        error!(error = %err, "Failed to prepare daemon socket directory");
        std::process::exit(1);
    }

    if let Err(err) = remove_existing_socket(&socket_path) {
        error!(error = %err, path = %socket_path.display(), "Failed to remove existing socket");
        std::process::exit(1);
    }

    let listener = match UnixListener::bind(&socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, path = %socket_path.display(), "Failed to bind daemon socket");
            std::process::exit(1);
        }
    };

    info!(path = %socket_path.display(), "Lockwatch daemon started");

    let db_path = match daemon_db_path() {
        Ok(path) => path,
        Err(err) => {
            error!(error = %err, "Failed to resolve daemon database path");
            std::process::exit(1);
        }
    };

    let db = match Db::new(db_path) {
        Ok(db) => db,
        Err(err) => {
            error!(error = %err, "Failed to initialize daemon database");
            std::process::exit(1);
        }
    };

    let config = match load_config(None) {
        Ok(config) => config,
        Err(err) => {
            warn!(error = %err, "Failed to load config; using defaults");
            LockwatchConfig::default()
        }
    };
    info!(
        fallback_min_ms = config.detection.fallback_min_ms,
        fallback_max_ms = config.detection.fallback_max_ms,
        retention_days = config.retention.days,
        "Lockwatch config loaded"
    );

    let shared_state = Arc::new(SharedState::new(Arc::new(db), &config));
    spawn_retention_sweeper(
        Arc::clone(&shared_state),
        config.retention.sweep_interval_secs,
    );

    for stream in listener.incoming() {
        match stream {
            Ok(stream) => {
                let state = Arc::clone(&shared_state);
                thread::spawn(|| handle_connection(stream, state));
            }
            Err(err) => {
                warn!(error = %err, "Failed to accept daemon connection");
            }
        }
    }
}

fn spawn_retention_sweeper(state: Arc<SharedState>, interval_secs: u64) {
    thread::spawn(move || loop {
        thread::sleep(Duration::from_secs(interval_secs));
        match state.sweep(Utc::now()) {
            Ok(report) => tracing::debug!(
                sessions_removed = report.sessions_removed,
                device_events_removed = report.device_events_removed,
                "Periodic retention sweep"
            ),
            Err(err) => warn!(error = %err, "Periodic retention sweep failed"),
        }
    });
}

fn init_logging() {
    let debug_enabled = env::var("LOCKWATCH_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    let filter = if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn daemon_socket_path() -> Result<PathBuf, String> {
    Ok(lockwatch_dir()?.join(SOCKET_NAME))
}

fn daemon_db_path() -> Result<PathBuf, String> {
    Ok(lockwatch_dir()?.join("daemon").join("lockwatch.db"))
}

fn prepare_socket_dir(socket_path: &Path) -> Result<(), String> {
    let parent = socket_path
        .parent()
        .ok_or_else(|| "Socket path has no parent".to_string())?;
    fs::create_dir_all(parent).map_err(|err| format!("Failed to create socket directory: {}", err))
}

fn remove_existing_socket(socket_path: &Path) -> Result<(), String> {
    if socket_path.exists() {
        fs::remove_file(socket_path)
            .map_err(|err| format!("Failed to remove existing socket: {}", err))?;
    }
    Ok(())
}

fn handle_connection(mut stream: UnixStream, state: Arc<SharedState>) {
    let request = match read_request(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            warn!(code = %err.code, message = %err.message, "Failed to read request");
            let response = Response::error_with_info(None, err);
            let _ = write_response(&mut stream, response);
            return;
        }
    };

    tracing::debug!(method = ?request.method, id = ?request.id, "Daemon request received");
    let response = handle_request(request, &state);
    let _ = write_response(&mut stream, response);
}

fn read_request(stream: &mut UnixStream) -> Result<Request, ErrorInfo> {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(READ_TIMEOUT_SECS)));

    let mut buffer = Vec::new();
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buffer.extend_from_slice(&chunk[..n]);
                if buffer.len() > MAX_REQUEST_BYTES {
                    return Err(ErrorInfo::new(
                        "request_too_large",
                        "request exceeded maximum size",
                    ));
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
                return Err(ErrorInfo::new("read_timeout", "request timed out"));
            }
            Err(err) => {
                return Err(ErrorInfo::new(
                    "read_error",
                    format!("failed to read request: {}", err),
                ));
            }
        }
    }

    let request_bytes = match buffer.iter().position(|b| *b == b'\n') {
        Some(index) => {
            if buffer[index + 1..].iter().any(|b| !b.is_ascii_whitespace()) {
                warn!("Extra bytes detected after newline; ignoring trailing data");
            }
            &buffer[..index]
        }
        None => buffer.as_slice(),
    };

    if request_bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ErrorInfo::new("empty_request", "request body was empty"));
    }

    serde_json::from_slice(request_bytes).map_err(|err| {
        ErrorInfo::new(
            "invalid_json",
            format!("request was not valid JSON: {}", err),
        )
    })
}

fn handle_request(request: Request, state: &SharedState) -> Response {
    if request.protocol_version != PROTOCOL_VERSION {
        return Response::error(
            request.id,
            "protocol_mismatch",
            "unsupported protocol version",
        );
    }

    match request.method {
        Method::GetHealth => {
            let mut data = serde_json::json!({
                "status": "ok",
                "pid": std::process::id(),
                "version": env!("CARGO_PKG_VERSION"),
                "protocol_version": PROTOCOL_VERSION,
            });
            if let Ok(value) = serde_json::to_value(state.tracking_snapshot()) {
                data["tracking"] = value;
            }
            Response::ok(request.id, data)
        }
        Method::UiEvent => {
            let envelope = match required_params(&request.id, request.params, "ui event")
                .and_then(|params| {
                    parse_ui_event(params).map_err(|err| Response::error_with_info(None, err))
                }) {
                Ok(envelope) => envelope,
                Err(response) => return with_id(response, request.id),
            };
            tracing::debug!(
                event_id = %envelope.event_id,
                event_type = ?envelope.event_type,
                "Received UI event"
            );
            serialized(request.id, "ui event outcome", state.handle_ui_event(&envelope))
        }
        Method::Power => {
            let envelope = match required_params(&request.id, request.params, "power")
                .and_then(|params| {
                    parse_power(params).map_err(|err| Response::error_with_info(None, err))
                }) {
                Ok(envelope) => envelope,
                Err(response) => return with_id(response, request.id),
            };
            info!(
                event_id = %envelope.event_id,
                action = %envelope.action,
                "Received power action"
            );
            let signal = state.handle_power(&envelope);
            Response::ok(
                request.id,
                serde_json::json!({ "accepted": signal.is_some(), "signal": signal }),
            )
        }
        Method::DeviceEvent => {
            let envelope = match required_params(&request.id, request.params, "device event")
                .and_then(|params| {
                    parse_device_event(params).map_err(|err| Response::error_with_info(None, err))
                }) {
                Ok(envelope) => envelope,
                Err(response) => return with_id(response, request.id),
            };
            match state.record_device_event(&envelope) {
                Ok(event) => Response::ok(
                    request.id,
                    serde_json::json!({ "accepted": event.is_some(), "event": event }),
                ),
                Err(err) => Response::error(
                    request.id,
                    "device_event_error",
                    format!("Failed to record device event: {}", err),
                ),
            }
        }
        Method::GetSessions => {
            let since = match parse_since(request.params) {
                Ok(since) => since,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match state.sessions_snapshot(since) {
                Ok(sessions) => {
                    tracing::debug!(sessions = sessions.len(), "Sessions snapshot");
                    serialized(request.id, "sessions", sessions)
                }
                Err(err) => Response::error(
                    request.id,
                    "sessions_error",
                    format!("Failed to fetch sessions: {}", err),
                ),
            }
        }
        Method::GetDeviceEvents => {
            let since = match parse_since(request.params) {
                Ok(since) => since,
                Err(err) => return Response::error_with_info(request.id, err),
            };
            match state.device_events_snapshot(since) {
                Ok(events) => {
                    tracing::debug!(events = events.len(), "Device events snapshot");
                    serialized(request.id, "device events", events)
                }
                Err(err) => Response::error(
                    request.id,
                    "device_events_error",
                    format!("Failed to fetch device events: {}", err),
                ),
            }
        }
    }
}

fn required_params(
    id: &Option<String>,
    params: Option<Value>,
    label: &str,
) -> Result<Value, Response> {
    params.ok_or_else(|| {
        Response::error(
            id.clone(),
            "invalid_params",
            format!("{} payload is required", label),
        )
    })
}

fn with_id(mut response: Response, id: Option<String>) -> Response {
    response.id = id;
    response
}

fn serialized<T: Serialize>(id: Option<String>, label: &str, value: T) -> Response {
    match serde_json::to_value(value) {
        Ok(value) => Response::ok(id, value),
        Err(err) => Response::error(
            id,
            "serialization_error",
            format!("Failed to serialize {}: {}", label, err),
        ),
    }
}

fn write_response(stream: &mut UnixStream, response: Response) -> std::io::Result<()> {
    serde_json::to_writer(&mut *stream, &response)?;
    stream.write_all(b"\n")?;
    stream.flush()?;
    Ok(())
}
