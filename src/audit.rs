//! Audit log of blocked uploads, kept in SQLite or in memory.

use crate::errors::{GuardError, GuardResult};
use crate::models::DetectionHit;
use crate::signatures::FileKind;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Mutex;

/// Default page size of [`SqliteAuditLog::recent_for_room`].
pub const DEFAULT_RECENT_LIMIT: usize = 200;

/// Audit record of one rejected upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockedUpload {
    pub original_name: String,
    pub stored_filename: String,
    pub mime_type: String,
    pub reason: String,
    pub detected_type: Option<FileKind>,
    pub entropy_bits: Option<f64>,
    pub hidden_files: Vec<DetectionHit>,
    pub room: Option<String>,
    /// Hex SHA-256 of the rejected bytes, when they could be read.
    pub sha256: Option<String>,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

/// Destination for blocked-upload records.
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: &BlockedUpload) -> GuardResult<()>;
}

/// Blocked-upload log in a SQLite database.
pub struct SqliteAuditLog {
    conn: Mutex<Connection>,
}

impl SqliteAuditLog {
    pub fn open(path: &Path) -> GuardResult<Self> {
        let conn = Connection::open(path)?;
        log::debug!("Opened audit database {:?}", path);
        Self::init(conn)
    }

    pub fn open_in_memory() -> GuardResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> GuardResult<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS blocked_uploads (
                id INTEGER PRIMARY KEY,
                original_name TEXT NOT NULL,
                stored_filename TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                reason TEXT NOT NULL,
                detected_type TEXT,
                entropy_bits REAL,
                hidden_files TEXT NOT NULL,
                room TEXT,
                sha256 TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_blocked_uploads_room ON blocked_uploads (room, id)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> GuardResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| GuardError::external("audit log", e.to_string()))
    }

    /// Newest records for `room`, at most `limit`.
    pub fn recent_for_room(&self, room: &str, limit: usize) -> GuardResult<Vec<BlockedUpload>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT original_name, stored_filename, mime_type, reason, detected_type,
                    entropy_bits, hidden_files, room, sha256, created_at
             FROM blocked_uploads WHERE room = ?1 ORDER BY id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![room, limit as i64], |row| {
            Ok((
                BlockedUpload {
                    original_name: row.get(0)?,
                    stored_filename: row.get(1)?,
                    mime_type: row.get(2)?,
                    reason: row.get(3)?,
                    detected_type: None,
                    entropy_bits: row.get(5)?,
                    hidden_files: Vec::new(),
                    room: row.get(7)?,
                    sha256: row.get(8)?,
                    created_at: row.get(9)?,
                },
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(6)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (mut entry, detected_type, hidden_files) = row?;
            entry.detected_type = detected_type
                .map(|t| serde_json::from_value(serde_json::Value::String(t)))
                .transpose()?;
            entry.hidden_files = serde_json::from_str(&hidden_files)?;
            out.push(entry);
        }
        Ok(out)
    }

    pub fn count(&self) -> GuardResult<u64> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM blocked_uploads", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

impl AuditSink for SqliteAuditLog {
    fn record(&self, entry: &BlockedUpload) -> GuardResult<()> {
        let hidden_files = serde_json::to_string(&entry.hidden_files)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO blocked_uploads (original_name, stored_filename, mime_type, reason,
                 detected_type, entropy_bits, hidden_files, room, sha256, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.original_name,
                entry.stored_filename,
                entry.mime_type,
                entry.reason,
                entry.detected_type.map(|t| t.label()),
                entry.entropy_bits,
                hidden_files,
                entry.room,
                entry.sha256,
                entry.created_at,
            ],
        )?;
        Ok(())
    }
}

/// In-process sink, mostly for tests.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<BlockedUpload>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<BlockedUpload> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, entry: &BlockedUpload) -> GuardResult<()> {
        self.entries
            .lock()
            .map_err(|e| GuardError::external("audit log", e.to_string()))?
            .push(entry.clone());
        Ok(())
    }
}
