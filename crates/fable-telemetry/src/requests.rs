use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;

/// One completed (or failed) generation request.
#[derive(Clone, Debug)]
pub struct RequestRecord {
    pub id: i64,
    pub timestamp: String,
    pub session_id: String,
    pub model: String,
    pub provider: String,
    pub duration_ms: i64,
    pub prompt_chars: i64,
    pub reply_chars: i64,
    pub outcome: String,
}

/// Audit log of generation requests, persisted to SQLite. Cheap to clone and
/// safe to share across tasks.
#[derive(Clone)]
pub struct RequestLog {
    conn: Arc<Mutex<Connection>>,
}

impl RequestLog {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS requests (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 session_id TEXT NOT NULL,
                 model TEXT NOT NULL,
                 provider TEXT NOT NULL,
                 duration_ms INTEGER NOT NULL,
                 prompt_chars INTEGER NOT NULL,
                 reply_chars INTEGER NOT NULL,
                 outcome TEXT NOT NULL
             );
             CREATE INDEX IF NOT EXISTS idx_requests_session ON requests(session_id);
             CREATE INDEX IF NOT EXISTS idx_requests_timestamp ON requests(timestamp);",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `outcome` is "ok", "cancelled", or an error kind string.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        &self,
        session_id: &str,
        model: &str,
        provider: &str,
        duration: Duration,
        prompt_chars: usize,
        reply_chars: usize,
        outcome: &str,
    ) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO requests (timestamp, session_id, model, provider, duration_ms, prompt_chars, reply_chars, outcome)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            rusqlite::params![
                Utc::now().to_rfc3339(),
                session_id,
                model,
                provider,
                duration.as_millis() as i64,
                prompt_chars as i64,
                reply_chars as i64,
                outcome,
            ],
        );
    }

    pub fn for_session(&self, session_id: &str) -> Result<Vec<RequestRecord>, rusqlite::Error> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, timestamp, session_id, model, provider, duration_ms, prompt_chars, reply_chars, outcome
             FROM requests WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map([session_id], |row| {
            Ok(RequestRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                session_id: row.get(2)?,
                model: row.get(3)?,
                provider: row.get(4)?,
                duration_ms: row.get(5)?,
                prompt_chars: row.get(6)?,
                reply_chars: row.get(7)?,
                outcome: row.get(8)?,
            })
        })?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM requests", [], |row| row.get(0))
    }
}
