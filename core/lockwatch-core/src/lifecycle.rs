//! Lock session lifecycle.
//!
//! The manager owns the session-tracking context (current session id, attempt
//! accumulator, pending storage task) and the attempt tracker. Transitions
//! reset the in-memory counters synchronously so new events are attributed to
//! the new session at once, while the store writes for the old session happen
//! on a background task.
//!
//! Storage tasks are chained: every task joins the one it replaced before it
//! touches the store, so the writes for session N always land before the
//! writes for session N+1. Values a task needs (attempt counts, timestamps) are
//! captured by value when the transition happens. The only state a task reads
//! live is the current session id, and only the task at the head of the chain
//! can be touching it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::classifier::UiEvent;
use crate::config::LockwatchConfig;
use crate::probe::FieldLengthProbe;
use crate::retention::RetentionPolicy;
use crate::store::SessionStore;
use crate::tracker::{AttemptTracker, FallbackWindow};
use crate::types::{LockSession, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LockPhase {
    Idle,
    Locking,
    Locked,
    Unlocking,
}

/// Handle to an in-flight storage task.
///
/// Waiting always returns, even if the task failed or panicked, so a broken
/// task never stalls the chain behind it.
pub struct PendingTask {
    label: &'static str,
    handle: JoinHandle<()>,
}

impl PendingTask {
    fn spawn<F>(label: &'static str, work: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            label,
            handle: thread::spawn(work),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub fn wait(self) {
        if self.handle.join().is_err() {
            warn!(task = self.label, "Session storage task panicked");
        }
    }
}

type SessionSlot = Arc<Mutex<Option<SessionId>>>;

/// Cross-task session state. Owned by the manager; never global.
#[derive(Default)]
struct SessionContext {
    current_session_id: SessionSlot,
    attempts: u32,
    pending_setup: Option<PendingTask>,
}

pub struct LockSessionManager {
    store: Arc<dyn SessionStore>,
    context: SessionContext,
    tracker: AttemptTracker,
    locked: bool,
}

impl LockSessionManager {
    /// Creates the manager and runs the startup retention sweep.
    pub fn new(store: Arc<dyn SessionStore>, config: &LockwatchConfig, now: DateTime<Utc>) -> Self {
        if let Err(err) = RetentionPolicy::from(&config.retention).sweep(store.as_ref(), now) {
            warn!(error = %err, "Startup retention sweep failed");
        }

        Self {
            store,
            context: SessionContext::default(),
            tracker: AttemptTracker::new(FallbackWindow::from(&config.detection)),
            locked: false,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn phase(&self) -> LockPhase {
        let task_running = self
            .context
            .pending_setup
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false);
        match (self.locked, task_running) {
            (true, true) => LockPhase::Locking,
            (true, false) => LockPhase::Locked,
            (false, true) => LockPhase::Unlocking,
            (false, false) => LockPhase::Idle,
        }
    }

    /// Attempts counted so far for the session being tracked.
    pub fn attempts(&self) -> u32 {
        self.context.attempts
    }

    pub fn entered_length(&self) -> u32 {
        self.tracker.entered_length()
    }

    /// The ongoing session's id, once its row has been inserted.
    pub fn current_session_id(&self) -> Option<SessionId> {
        *lock_slot(&self.context.current_session_id)
    }

    /// Feeds one interface event to the tracker. Ignored while unlocked.
    /// Returns true if the event completed an attempt.
    pub fn handle_event(&mut self, event: &UiEvent, probe: &dyn FieldLengthProbe) -> bool {
        if !self.locked {
            return false;
        }
        let completed = self.tracker.handle(event, probe);
        if completed {
            self.context.attempts = self.context.attempts.saturating_add(1);
            debug!(attempts = self.context.attempts, "Attempt recorded");
        }
        completed
    }

    /// Device became locked: close out whatever session was open and start a new one.
    pub fn on_locked(&mut self, now: DateTime<Utc>) {
        let previous_task = self.context.pending_setup.take();
        let previous_attempts = std::mem::take(&mut self.context.attempts);
        self.tracker.reset();
        self.locked = true;

        let store = Arc::clone(&self.store);
        let slot = Arc::clone(&self.context.current_session_id);
        let task = PendingTask::spawn("lock", move || {
            if let Some(task) = previous_task {
                task.wait();
            }

            let previous_id = *lock_slot(&slot);
            if let Some(id) = previous_id {
                close_session(store.as_ref(), id, |session| {
                    session.superseded(previous_attempts)
                });
                info!(session_id = %id, attempts = previous_attempts, "Session superseded by relock");
            }

            let opened = match store.insert_session(&LockSession::opened(now)) {
                Ok(id) => {
                    info!(session_id = %id, lock_time = %now.to_rfc3339(), "Session opened");
                    Some(id)
                }
                Err(err) => {
                    warn!(error = %err, "Failed to insert lock session");
                    None
                }
            };
            *lock_slot(&slot) = opened;
        });
        self.context.pending_setup = Some(task);
    }

    /// Device became unlocked: count the final entry and close the session.
    pub fn on_unlocked(&mut self, now: DateTime<Utc>) {
        if self.locked && self.tracker.finish_on_unlock() {
            self.context.attempts = self.context.attempts.saturating_add(1);
        }

        let previous_task = self.context.pending_setup.take();
        let attempts = std::mem::take(&mut self.context.attempts);
        self.tracker.reset();
        self.locked = false;

        let store = Arc::clone(&self.store);
        let slot = Arc::clone(&self.context.current_session_id);
        let task = PendingTask::spawn("unlock", move || {
            if let Some(task) = previous_task {
                task.wait();
            }

            let current = lock_slot(&slot).take();
            let id = match current {
                Some(id) => id,
                None => {
                    debug!("Unlock with no open session");
                    return;
                }
            };
            close_session(store.as_ref(), id, |session| session.unlocked(now, attempts));
            info!(session_id = %id, attempts, "Session closed by unlock");
        });
        self.context.pending_setup = Some(task);
    }

    /// Blocks until every queued storage write has finished.
    pub fn flush(&mut self) {
        if let Some(task) = self.context.pending_setup.take() {
            task.wait();
        }
    }
}

impl Drop for LockSessionManager {
    fn drop(&mut self) {
        self.flush();
    }
}

fn close_session(
    store: &dyn SessionStore,
    id: SessionId,
    close: impl FnOnce(LockSession) -> LockSession,
) {
    match store.get_session(id) {
        Ok(Some(session)) => {
            if let Err(err) = store.update_session(&close(session)) {
                warn!(session_id = %id, error = %err, "Failed to close lock session");
            }
        }
        // Pruned or never written; nothing to close.
        Ok(None) => debug!(session_id = %id, "Session row missing at close"),
        Err(err) => warn!(session_id = %id, error = %err, "Failed to load lock session"),
    }
}

fn lock_slot(slot: &Mutex<Option<SessionId>>) -> MutexGuard<'_, Option<SessionId>> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
