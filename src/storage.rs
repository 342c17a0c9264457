//! SQLite persistence for agent memory threads and workflow run snapshots.
//!
//! All SQL lives in `sql/*.sql` files, loaded via `include_str!`.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use uuid::Uuid;

use crate::config::StorageLocation;
use crate::error::Result;
use crate::openai::{ChatMessage, Role};

const SQL_SCHEMA: &str = include_str!("../sql/schema.sql");
const SQL_INSERT_THREAD: &str = include_str!("../sql/insert_thread.sql");
const SQL_SELECT_THREAD: &str = include_str!("../sql/select_thread.sql");
const SQL_SELECT_THREADS: &str = include_str!("../sql/select_threads.sql");
const SQL_TOUCH_THREAD: &str = include_str!("../sql/touch_thread.sql");
const SQL_INSERT_MESSAGE: &str = include_str!("../sql/insert_message.sql");
const SQL_RECENT_MESSAGES: &str = include_str!("../sql/recent_messages.sql");
const SQL_UPSERT_SNAPSHOT: &str = include_str!("../sql/upsert_snapshot.sql");
const SQL_SELECT_SNAPSHOT: &str = include_str!("../sql/select_snapshot.sql");
const SQL_SELECT_SNAPSHOTS: &str = include_str!("../sql/select_snapshots.sql");

/// A conversation thread owned by a resource (a user, a workflow, ...).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thread {
    pub id: String,
    pub resource_id: String,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredMessage {
    pub id: String,
    pub thread_id: String,
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl From<StoredMessage> for ChatMessage {
    fn from(msg: StoredMessage) -> Self {
        ChatMessage {
            role: msg.role,
            content: msg.content,
        }
    }
}

/// Index entry for a persisted workflow run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub run_id: String,
    pub workflow_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Embedded SQLite store.
///
/// Wraps a `rusqlite::Connection` in a `Mutex`; every operation is a short
/// synchronous critical section and no guard is held across an `.await`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a database file at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::init(Connection::open(path)?)
    }

    /// Create an in-memory database (useful for testing).
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    pub fn open_location(location: &StorageLocation) -> Result<Self> {
        match location {
            StorageLocation::InMemory => Self::in_memory(),
            StorageLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Self::open(path)
            }
        }
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SQL_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-statement leaves SQLite itself consistent.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Return the thread, creating it for `resource_id` if it does not exist.
    pub fn ensure_thread(&self, thread_id: &str, resource_id: &str) -> Result<Thread> {
        let conn = self.conn();
        let inserted = conn.execute(
            SQL_INSERT_THREAD,
            params![thread_id, resource_id, Option::<String>::None, Utc::now()],
        )?;
        if inserted > 0 {
            tracing::debug!(thread_id, resource_id, "created memory thread");
        }
        let thread = conn.query_row(SQL_SELECT_THREAD, [thread_id], thread_from_row)?;
        Ok(thread)
    }

    pub fn thread(&self, thread_id: &str) -> Result<Option<Thread>> {
        let conn = self.conn();
        let thread = conn
            .query_row(SQL_SELECT_THREAD, [thread_id], thread_from_row)
            .optional()?;
        Ok(thread)
    }

    /// Threads ordered by most recent activity.
    pub fn list_threads(&self, limit: usize) -> Result<Vec<Thread>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(SQL_SELECT_THREADS)?;
        let threads = stmt
            .query_map([limit as i64], thread_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(threads)
    }

    /// Append a message to an existing thread and bump its activity time.
    pub fn append_message(&self, thread_id: &str, message: &ChatMessage) -> Result<StoredMessage> {
        let stored = StoredMessage {
            id: Uuid::new_v4().to_string(),
            thread_id: thread_id.to_string(),
            role: message.role,
            content: message.content.clone(),
            created_at: Utc::now(),
        };
        let conn = self.conn();
        conn.execute(
            SQL_INSERT_MESSAGE,
            params![
                stored.id,
                stored.thread_id,
                stored.role.as_str(),
                stored.content,
                stored.created_at
            ],
        )?;
        conn.execute(SQL_TOUCH_THREAD, params![thread_id, stored.created_at])?;
        Ok(stored)
    }

    /// The last `limit` messages of a thread, oldest first.
    pub fn recent_messages(&self, thread_id: &str, limit: usize) -> Result<Vec<StoredMessage>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(SQL_RECENT_MESSAGES)?;
        let messages = stmt
            .query_map(params![thread_id, limit as i64], message_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(messages)
    }

    /// Insert or replace the serialized snapshot of a workflow run.
    pub fn save_snapshot(
        &self,
        run_id: &str,
        workflow_id: &str,
        status: &str,
        snapshot: &str,
    ) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            SQL_UPSERT_SNAPSHOT,
            params![run_id, workflow_id, status, snapshot, Utc::now()],
        )?;
        Ok(())
    }

    pub fn load_snapshot(&self, run_id: &str) -> Result<Option<String>> {
        let conn = self.conn();
        let snapshot = conn
            .query_row(SQL_SELECT_SNAPSHOT, [run_id], |row| row.get(0))
            .optional()?;
        Ok(snapshot)
    }

    /// Persisted runs, newest first.
    pub fn list_snapshots(&self, limit: usize) -> Result<Vec<SnapshotSummary>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(SQL_SELECT_SNAPSHOTS)?;
        let rows = stmt
            .query_map([limit as i64], |row| {
                Ok(SnapshotSummary {
                    run_id: row.get(0)?,
                    workflow_id: row.get(1)?,
                    status: row.get(2)?,
                    created_at: row.get(3)?,
                    updated_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn thread_from_row(row: &Row<'_>) -> rusqlite::Result<Thread> {
    Ok(Thread {
        id: row.get(0)?,
        resource_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn message_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMessage> {
    let role: String = row.get(2)?;
    let role = role.parse::<Role>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(StoredMessage {
        id: row.get(0)?,
        thread_id: row.get(1)?,
        role,
        content: row.get(3)?,
        created_at: row.get(4)?,
    })
}
