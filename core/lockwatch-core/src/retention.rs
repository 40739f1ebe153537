//! Retention sweep for lock sessions and device events.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use crate::config::{RetentionConfig, DEFAULT_RETENTION_DAYS};
use crate::error::Result;
use crate::store::SessionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    window: Duration,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sessions_removed: usize,
    pub device_events_removed: usize,
}

impl RetentionPolicy {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.window
    }

    /// Deletes everything older than the retention window.
    pub fn sweep(&self, store: &dyn SessionStore, now: DateTime<Utc>) -> Result<SweepReport> {
        let cutoff = self.cutoff(now);
        let report = SweepReport {
            sessions_removed: store.delete_sessions_before(cutoff)?,
            device_events_removed: store.delete_device_events_before(cutoff)?,
        };
        if report != SweepReport::default() {
            info!(
                cutoff = %cutoff.to_rfc3339(),
                sessions = report.sessions_removed,
                device_events = report.device_events_removed,
                "Retention sweep removed rows"
            );
        }
        Ok(report)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(Duration::days(DEFAULT_RETENTION_DAYS))
    }
}

impl From<&RetentionConfig> for RetentionPolicy {
    fn from(config: &RetentionConfig) -> Self {
        Self::new(config.window())
    }
}
