//! State shared by the daemon's connection handlers.
//!
//! The lifecycle manager sits behind a single mutex, so UI events and power
//! transitions are applied one at a time in arrival order. Each event id is
//! applied at most once; a resend gets the outcome of the first delivery.
//! Read-only queries go straight to the store and never wait on the manager.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};

use lockwatch_core::device_events::record_device_action;
use lockwatch_core::{
    dispatch_power_action, DeviceEvent, LockPhase, LockSession, LockSessionManager,
    LockwatchConfig, NoFieldProbe, PowerSignal, RetentionPolicy, SessionId, SessionStore,
    SweepReport, UiEvent, WindowTreeProbe,
};
use lockwatch_protocol::{
    parse_timestamp, DeviceEventEnvelope, PowerEnvelope, UiEventEnvelope, UiEventType,
};

use crate::recent_events::RecentEvents;

pub struct SharedState {
    store: Arc<dyn SessionStore>,
    tracking: Mutex<Tracking>,
    retention: RetentionPolicy,
}

/// Everything guarded by the event-path mutex. Replay checks happen under the
/// same lock as the apply, so two copies of one event cannot both get through.
struct Tracking {
    manager: LockSessionManager,
    ui_events: RecentEvents<UiEventOutcome>,
    power_events: RecentEvents<Option<PowerSignal>>,
    device_events: RecentEvents<Option<DeviceEvent>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UiEventOutcome {
    pub accepted: bool,
    pub attempt_recorded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored_reason: Option<&'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackingSnapshot {
    pub phase: LockPhase,
    pub locked: bool,
    pub attempts: u32,
    pub entered_length: u32,
    pub current_session_id: Option<SessionId>,
}

impl SharedState {
    pub fn new(store: Arc<dyn SessionStore>, config: &LockwatchConfig) -> Self {
        let manager = LockSessionManager::new(Arc::clone(&store), config, Utc::now());
        Self {
            store,
            tracking: Mutex::new(Tracking {
                manager,
                ui_events: RecentEvents::default(),
                power_events: RecentEvents::default(),
                device_events: RecentEvents::default(),
            }),
            retention: RetentionPolicy::from(&config.retention),
        }
    }

    pub fn handle_ui_event(&self, envelope: &UiEventEnvelope) -> UiEventOutcome {
        let mut tracking = self.lock_tracking();
        if let Some(outcome) = tracking.ui_events.get(&envelope.event_id) {
            tracing::debug!(event_id = %envelope.event_id, "Replayed UI event; not reapplied");
            return outcome;
        }

        let outcome = apply_ui_event(&mut tracking.manager, envelope);
        tracking
            .ui_events
            .remember(&envelope.event_id, outcome.clone());
        outcome
    }

    pub fn handle_power(&self, envelope: &PowerEnvelope) -> Option<PowerSignal> {
        let mut tracking = self.lock_tracking();
        if let Some(signal) = tracking.power_events.get(&envelope.event_id) {
            tracing::debug!(event_id = %envelope.event_id, "Replayed power action; not reapplied");
            return signal;
        }

        let at = event_time(&envelope.recorded_at);
        let signal = dispatch_power_action(&mut tracking.manager, &envelope.action, at);
        tracking.power_events.remember(&envelope.event_id, signal);
        signal
    }

    /// Failed inserts are not remembered, so a retry after an error is applied.
    pub fn record_device_event(
        &self,
        envelope: &DeviceEventEnvelope,
    ) -> Result<Option<DeviceEvent>, String> {
        let mut tracking = self.lock_tracking();
        if let Some(event) = tracking.device_events.get(&envelope.event_id) {
            tracing::debug!(event_id = %envelope.event_id, "Replayed device event; not reapplied");
            return Ok(event);
        }

        let at = event_time(&envelope.recorded_at);
        let event = record_device_action(self.store.as_ref(), &envelope.action, at)
            .map_err(String::from)?;
        tracking
            .device_events
            .remember(&envelope.event_id, event.clone());
        Ok(event)
    }

    pub fn sessions_snapshot(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<LockSession>, String> {
        let since = since.unwrap_or_else(|| self.retention.cutoff(Utc::now()));
        self.store.recent_sessions(since).map_err(String::from)
    }

    pub fn device_events_snapshot(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<DeviceEvent>, String> {
        let since = since.unwrap_or_else(|| self.retention.cutoff(Utc::now()));
        self.store.recent_device_events(since).map_err(String::from)
    }

    pub fn tracking_snapshot(&self) -> TrackingSnapshot {
        let tracking = self.lock_tracking();
        let manager = &tracking.manager;
        TrackingSnapshot {
            phase: manager.phase(),
            locked: manager.is_locked(),
            attempts: manager.attempts(),
            entered_length: manager.entered_length(),
            current_session_id: manager.current_session_id(),
        }
    }

    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, String> {
        self.retention
            .sweep(self.store.as_ref(), now)
            .map_err(String::from)
    }

    /// Waits for queued session writes. Used before answering queries in tests.
    #[cfg(test)]
    fn flush(&self) {
        self.lock_tracking().manager.flush();
    }

    fn lock_tracking(&self) -> MutexGuard<'_, Tracking> {
        self.tracking
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn apply_ui_event(
    manager: &mut LockSessionManager,
    envelope: &UiEventEnvelope,
) -> UiEventOutcome {
    if envelope.keyguard_locked == Some(false) {
        return UiEventOutcome::ignored("keyguard_unlocked");
    }
    if !manager.is_locked() {
        return UiEventOutcome::ignored("not_locked");
    }

    let event = ui_event_from_envelope(envelope, event_time(&envelope.recorded_at));
    let attempt_recorded = match envelope.windows.as_deref() {
        Some(windows) => manager.handle_event(&event, &WindowTreeProbe::new(windows)),
        None => manager.handle_event(&event, &NoFieldProbe),
    };
    if attempt_recorded {
        tracing::info!(
            event_id = %envelope.event_id,
            event_type = ?envelope.event_type,
            attempts = manager.attempts(),
            "Attempt recorded"
        );
    }

    UiEventOutcome {
        accepted: true,
        attempt_recorded,
        ignored_reason: None,
    }
}

impl UiEventOutcome {
    fn ignored(reason: &'static str) -> Self {
        tracing::debug!(reason, "UI event ignored");
        Self {
            accepted: false,
            attempt_recorded: false,
            ignored_reason: Some(reason),
        }
    }
}

fn ui_event_from_envelope(envelope: &UiEventEnvelope, at: DateTime<Utc>) -> UiEvent {
    match envelope.event_type {
        UiEventType::ViewClicked => UiEvent::ClickedElement {
            description: envelope.content_description.clone(),
            text: envelope.text.first().cloned(),
            at,
        },
        UiEventType::ViewTextChanged => UiEvent::text_changed(envelope.text.as_slice(), at),
        UiEventType::WindowContentChanged => UiEvent::ContentChanged { at },
    }
}

// Envelopes are validated before they reach the state, so the fallback only
// covers callers that skip validation.
fn event_time(recorded_at: &str) -> DateTime<Utc> {
    parse_timestamp(recorded_at).unwrap_or_else(Utc::now)
}
