//! lockwatch-hook: forwards device events to the lockwatch daemon.
//!
//! Invoked by the acquisition layer (accessibility service and broadcast
//! receivers) once per event. Also used to inspect recorded sessions.
//!
//! ## Subcommands
//!
//! - `ui-event`: forward an accessibility event (JSON on stdin)
//! - `power`: forward a screen power broadcast
//! - `device`: forward a boot / shutdown broadcast
//! - `sessions`, `device-events`, `health`: query the daemon, print JSON

mod daemon_client;
mod forward;
mod logging;

use chrono::Utc;
use clap::{Parser, Subcommand};
use lockwatch_protocol::{parse_timestamp, Method};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "lockwatch-hook")]
#[command(about = "Lockwatch acquisition hook and query client")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Forward an accessibility event (reads JSON from stdin)
    UiEvent,

    /// Forward a screen power broadcast
    Power {
        /// Broadcast action (e.g., android.intent.action.SCREEN_OFF)
        #[arg(value_name = "ACTION")]
        action: String,
    },

    /// Forward a boot or shutdown broadcast
    Device {
        /// Broadcast action (e.g., android.intent.action.BOOT_COMPLETED)
        #[arg(value_name = "ACTION")]
        action: String,
    },

    /// Print recorded lock sessions, newest first
    Sessions {
        /// Only sessions locked after this RFC3339 time
        #[arg(long)]
        since: Option<String>,
    },

    /// Print recorded boot / shutdown events, newest first
    DeviceEvents {
        /// Only events after this RFC3339 time
        #[arg(long)]
        since: Option<String>,
    },

    /// Print daemon health and current tracking state
    Health,
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    let result = match cli.command {
        // Forwarding must never disrupt the caller: log and exit 0.
        Commands::UiEvent => {
            if let Err(e) = forward_ui_event() {
                tracing::warn!(error = %e, "lockwatch-hook ui-event failed");
            }
            Ok(())
        }
        Commands::Power { action } => {
            if let Err(e) = forward_power(&action) {
                tracing::warn!(error = %e, action = %action, "lockwatch-hook power failed");
            }
            Ok(())
        }
        Commands::Device { action } => {
            if let Err(e) = forward_device(&action) {
                tracing::warn!(error = %e, action = %action, "lockwatch-hook device failed");
            }
            Ok(())
        }
        Commands::Sessions { since } => run_query(Method::GetSessions, since),
        Commands::DeviceEvents { since } => run_query(Method::GetDeviceEvents, since),
        Commands::Health => run_query(Method::GetHealth, None),
    };

    if let Err(e) = result {
        tracing::error!(error = %e, "lockwatch-hook query failed");
        eprintln!("lockwatch-hook: {}", e);
        std::process::exit(1);
    }
}

fn forward_ui_event() -> Result<(), String> {
    let envelope = forward::read_ui_event_input()?.into_envelope(Utc::now())?;
    let data = daemon_client::send_ui_event(&envelope)?;
    tracing::debug!(event_id = %envelope.event_id, response = %data, "UI event forwarded");
    Ok(())
}

fn forward_power(action: &str) -> Result<(), String> {
    let envelope = forward::power_envelope(action, Utc::now())?;
    let data = daemon_client::send_power(&envelope)?;
    tracing::info!(event_id = %envelope.event_id, action, response = %data, "Power action forwarded");
    Ok(())
}

fn forward_device(action: &str) -> Result<(), String> {
    let envelope = forward::device_event_envelope(action, Utc::now())?;
    let data = daemon_client::send_device_event(&envelope)?;
    tracing::info!(event_id = %envelope.event_id, action, response = %data, "Device action forwarded");
    Ok(())
}

fn run_query(method: Method, since: Option<String>) -> Result<(), String> {
    let params = since_params(since)?;
    let data = daemon_client::query(method, params)?;
    let rendered = serde_json::to_string_pretty(&data)
        .map_err(|e| format!("Failed to render response: {}", e))?;
    println!("{}", rendered);
    Ok(())
}

fn since_params(since: Option<String>) -> Result<Option<Value>, String> {
    match since {
        Some(value) => {
            if parse_timestamp(&value).is_none() {
                return Err(format!("--since must be RFC3339, got {:?}", value));
            }
            Ok(Some(serde_json::json!({ "since": value })))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_power_and_query_subcommands() {
        let cli = Cli::try_parse_from(["lockwatch-hook", "power", "screen_off"]).expect("parse");
        assert!(matches!(cli.command, Commands::Power { action } if action == "screen_off"));

        let cli = Cli::try_parse_from([
            "lockwatch-hook",
            "sessions",
            "--since",
            "2026-10-01T00:00:00Z",
        ])
        .expect("parse");
        assert!(matches!(cli.command, Commands::Sessions { since: Some(_) }));
    }

    #[test]
    fn since_help_describes_exclusive_bound() {
        let command = Cli::command();
        for name in ["sessions", "device-events"] {
            let subcommand = command.find_subcommand(name).expect("subcommand");
            let since = subcommand
                .get_arguments()
                .find(|arg| arg.get_id() == "since")
                .expect("since arg");
            let help = since.get_help().map(ToString::to_string).unwrap_or_default();
            assert!(help.contains("after this"), "{name}: {help}");
            assert!(!help.contains("at or after"), "{name}: {help}");
        }
    }

    #[test]
    fn since_params_validate_timestamp() {
        assert_eq!(since_params(None).expect("none"), None);
        let params = since_params(Some("2026-10-01T00:00:00Z".to_string()))
            .expect("valid")
            .expect("params");
        assert_eq!(
            params.get("since").and_then(Value::as_str),
            Some("2026-10-01T00:00:00Z")
        );
        assert!(since_params(Some("yesterday".to_string())).is_err());
    }
}
