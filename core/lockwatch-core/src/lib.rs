//! lockwatch-core: PIN attempt detection and lock-session lifecycle.
//!
//! Raw interface events are classified into entry signals, resolved into
//! attempts by the tracker, and attributed to the lock session owned by the
//! lifecycle manager. Sessions and device power events are persisted through
//! the [`SessionStore`] seam; [`Db`] is the SQLite implementation.
//!
//! ## Modules
//!
//! - [`classifier`]: raw event → signal
//! - [`tracker`]: signals + probe readings → completed attempts
//! - [`lifecycle`]: lock/unlock transitions and chained storage tasks
//! - [`watcher`]: power broadcasts → lifecycle transitions
//! - [`device_events`]: boot/shutdown recording
//! - [`retention`]: pruning of old rows

pub mod classifier;
pub mod config;
pub mod db;
pub mod device_events;
pub mod error;
pub mod lifecycle;
pub mod probe;
pub mod retention;
pub mod store;
pub mod tracker;
pub mod types;
pub mod watcher;

pub use classifier::{classify, Signal, UiEvent};
pub use config::{load_config, LockwatchConfig};
pub use db::Db;
pub use error::{LockwatchError, Result};
pub use lifecycle::{LockPhase, LockSessionManager};
pub use probe::{FieldLengthProbe, NoFieldProbe, WindowTreeProbe};
pub use retention::{RetentionPolicy, SweepReport};
pub use store::SessionStore;
pub use tracker::{AttemptTracker, FallbackWindow};
pub use types::{DeviceEvent, DeviceEventType, LockSession, SessionId};
pub use watcher::{dispatch_power_action, PowerSignal};
