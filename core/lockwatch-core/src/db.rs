//! SQLite persistence for lock sessions and device events.
//!
//! Timestamps are stored as epoch milliseconds so range deletes and ordering
//! stay in SQL. Each call opens its own connection, so storage tasks running on
//! different threads never share a handle.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::PathBuf;

use crate::error::{LockwatchError, Result};
use crate::store::SessionStore;
use crate::types::{DeviceEvent, DeviceEventType, LockSession, SessionId};

const SESSION_COLUMNS: &str =
    "id, lock_time_ms, unlock_time_ms, attempts, was_successful, is_ongoing";

pub struct Db {
    path: PathBuf,
}

impl Db {
    pub fn new(path: PathBuf) -> Result<Self> {
        let db = Self { path };
        db.init_schema()?;
        Ok(db)
    }

    fn init_schema(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch(
                "BEGIN;
                 CREATE TABLE IF NOT EXISTS lock_sessions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    lock_time_ms INTEGER NOT NULL,
                    unlock_time_ms INTEGER,
                    attempts INTEGER NOT NULL DEFAULT 0,
                    was_successful INTEGER NOT NULL DEFAULT 0,
                    is_ongoing INTEGER NOT NULL DEFAULT 1
                 );
                 CREATE INDEX IF NOT EXISTS lock_sessions_lock_time
                    ON lock_sessions (lock_time_ms);
                 CREATE TABLE IF NOT EXISTS device_events (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_type TEXT NOT NULL,
                    timestamp_ms INTEGER NOT NULL
                 );
                 CREATE INDEX IF NOT EXISTS device_events_timestamp
                    ON device_events (timestamp_ms);
                 COMMIT;",
            )
            .map_err(LockwatchError::storage("Failed to initialize schema"))
        })
    }

    fn with_connection<T>(&self, op: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut conn = self.open()?;
        op(&mut conn)
    }

    fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            fs_err::create_dir_all(parent).map_err(|source| LockwatchError::Io {
                context: "Failed to create lockwatch data dir".to_string(),
                source,
            })?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(LockwatchError::storage("Failed to open sqlite db"))?;

        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(LockwatchError::storage("Failed to enable WAL"))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(LockwatchError::storage("Failed to set synchronous"))?;
        conn.pragma_update(None, "busy_timeout", 5000)
            .map_err(LockwatchError::storage("Failed to set busy_timeout"))?;

        Ok(conn)
    }
}

impl SessionStore for Db {
    fn insert_session(&self, session: &LockSession) -> Result<SessionId> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO lock_sessions \
                    (lock_time_ms, unlock_time_ms, attempts, was_successful, is_ongoing) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.lock_time.timestamp_millis(),
                    session.unlock_time.map(|time| time.timestamp_millis()),
                    session.attempts,
                    session.was_successful,
                    session.is_ongoing
                ],
            )
            .map_err(LockwatchError::storage("Failed to insert session"))?;
            Ok(SessionId(conn.last_insert_rowid()))
        })
    }

    fn update_session(&self, session: &LockSession) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE lock_sessions SET \
                    lock_time_ms = ?2, \
                    unlock_time_ms = ?3, \
                    attempts = ?4, \
                    was_successful = ?5, \
                    is_ongoing = ?6 \
                 WHERE id = ?1",
                params![
                    session.id.0,
                    session.lock_time.timestamp_millis(),
                    session.unlock_time.map(|time| time.timestamp_millis()),
                    session.attempts,
                    session.was_successful,
                    session.is_ongoing
                ],
            )
            .map_err(LockwatchError::storage("Failed to update session"))?;
            Ok(())
        })
    }

    fn get_session(&self, id: SessionId) -> Result<Option<LockSession>> {
        self.with_connection(|conn| {
            conn.query_row(
                &format!("SELECT {} FROM lock_sessions WHERE id = ?1", SESSION_COLUMNS),
                params![id.0],
                session_from_row,
            )
            .optional()
            .map_err(LockwatchError::storage("Failed to query session"))
        })
    }

    fn delete_sessions_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM lock_sessions WHERE lock_time_ms < ?1",
                params![cutoff.timestamp_millis()],
            )
            .map_err(LockwatchError::storage("Failed to prune sessions"))
        })
    }

    fn recent_sessions(&self, since: DateTime<Utc>) -> Result<Vec<LockSession>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM lock_sessions WHERE lock_time_ms > ?1 \
                     ORDER BY lock_time_ms DESC, id DESC",
                    SESSION_COLUMNS
                ))
                .map_err(LockwatchError::storage("Failed to prepare sessions query"))?;

            let rows = stmt
                .query_map(params![since.timestamp_millis()], session_from_row)
                .map_err(LockwatchError::storage("Failed to query sessions"))?;

            let mut sessions = Vec::new();
            for row in rows {
                sessions.push(row.map_err(LockwatchError::storage("Failed to decode session row"))?);
            }
            Ok(sessions)
        })
    }

    fn insert_device_event(
        &self,
        event_type: DeviceEventType,
        timestamp: DateTime<Utc>,
    ) -> Result<DeviceEvent> {
        self.with_connection(|conn| {
            conn.execute(
                "INSERT INTO device_events (event_type, timestamp_ms) VALUES (?1, ?2)",
                params![event_type.as_str(), timestamp.timestamp_millis()],
            )
            .map_err(LockwatchError::storage("Failed to insert device event"))?;
            Ok(DeviceEvent {
                id: conn.last_insert_rowid(),
                event_type,
                timestamp,
            })
        })
    }

    fn delete_device_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with_connection(|conn| {
            conn.execute(
                "DELETE FROM device_events WHERE timestamp_ms < ?1",
                params![cutoff.timestamp_millis()],
            )
            .map_err(LockwatchError::storage("Failed to prune device events"))
        })
    }

    fn recent_device_events(&self, since: DateTime<Utc>) -> Result<Vec<DeviceEvent>> {
        self.with_connection(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, event_type, timestamp_ms FROM device_events \
                     WHERE timestamp_ms > ?1 ORDER BY timestamp_ms DESC, id DESC",
                )
                .map_err(LockwatchError::storage("Failed to prepare device events query"))?;

            let rows = stmt
                .query_map(params![since.timestamp_millis()], |row| {
                    let raw: String = row.get(1)?;
                    let event_type = DeviceEventType::from_str(&raw)
                        .ok_or_else(|| conversion_error(1, format!("Unknown device event: {}", raw)))?;
                    Ok(DeviceEvent {
                        id: row.get(0)?,
                        event_type,
                        timestamp: millis_column(row, 2)?,
                    })
                })
                .map_err(LockwatchError::storage("Failed to query device events"))?;

            let mut events = Vec::new();
            for row in rows {
                events.push(row.map_err(LockwatchError::storage("Failed to decode device event row"))?);
            }
            Ok(events)
        })
    }
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<LockSession> {
    let unlock_time = match row.get::<_, Option<i64>>(2)? {
        Some(millis) => Some(from_millis(2, millis)?),
        None => None,
    };
    Ok(LockSession {
        id: SessionId(row.get(0)?),
        lock_time: millis_column(row, 1)?,
        unlock_time,
        attempts: row.get(3)?,
        was_successful: row.get(4)?,
        is_ongoing: row.get(5)?,
    })
}

fn millis_column(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    from_millis(index, row.get(index)?)
}

fn from_millis(index: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| conversion_error(index, format!("Timestamp out of range: {}", millis)))
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Integer,
        Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, message)),
    )
}
