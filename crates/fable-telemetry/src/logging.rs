use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::field::{Field, Visit};
use tracing::{span, Event, Level, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

/// SQLite sink that persists warn+ logs, so problems in a finished play
/// session can still be inspected afterwards. Write-only: reading the file
/// is a job for the sqlite3 shell, not the game.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             CREATE TABLE IF NOT EXISTS logs (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 timestamp TEXT NOT NULL,
                 level TEXT NOT NULL,
                 target TEXT NOT NULL,
                 message TEXT NOT NULL,
                 session_id TEXT,
                 model TEXT
             );
             CREATE INDEX IF NOT EXISTS idx_logs_session ON logs(session_id);",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn insert(&self, level: &Level, target: &str, entry: &LogEntry) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO logs (timestamp, level, target, message, session_id, model)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                Utc::now().to_rfc3339(),
                level.to_string(),
                target,
                entry.message,
                entry.session_id,
                entry.model,
            ],
        );
    }
}

/// The message plus the two fields the game correlates on. Anything else an
/// event carries is dropped; the stderr layer still shows it live.
#[derive(Clone, Default)]
struct LogEntry {
    message: String,
    session_id: Option<String>,
    model: Option<String>,
}

impl LogEntry {
    fn inherit(&mut self, parent: &LogEntry) {
        if self.session_id.is_none() {
            self.session_id.clone_from(&parent.session_id);
        }
        if self.model.is_none() {
            self.model.clone_from(&parent.model);
        }
    }

    fn set(&mut self, field: &Field, value: String) {
        match field.name() {
            "message" => self.message = value,
            "session_id" => self.session_id = Some(value),
            "model" => self.model = Some(value),
            _ => {}
        }
    }
}

impl Visit for LogEntry {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.set(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        self.set(field, rendered.trim_matches('"').to_string());
    }
}

/// tracing Layer that writes warn+ events to SQLite. `session_id` and
/// `model` recorded on an enclosing span are inherited by events that
/// don't carry them.
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut entry = LogEntry::default();
        attrs.record(&mut entry);
        if entry.session_id.is_some() || entry.model.is_some() {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(entry);
            }
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > Level::WARN {
            return;
        }

        let mut entry = LogEntry::default();
        event.record(&mut entry);

        if entry.session_id.is_none() || entry.model.is_none() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope {
                    if let Some(parent) = span.extensions().get::<LogEntry>() {
                        entry.inherit(parent);
                    }
                }
            }
        }

        self.sink.insert(metadata.level(), metadata.target(), &entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tracing_subscriber::layer::SubscriberExt;

    fn with_layer(path: &Path, f: impl FnOnce()) {
        let sink = Arc::new(SqliteLogSink::new(path).unwrap());
        let subscriber = tracing_subscriber::registry().with(SqliteLogLayer::new(sink));
        tracing::subscriber::with_default(subscriber, f);
    }

    fn row_count(path: &Path) -> i64 {
        Connection::open(path)
            .unwrap()
            .query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
            .unwrap()
    }

    fn first_row(path: &Path) -> (String, String, Option<String>, Option<String>) {
        Connection::open(path)
            .unwrap()
            .query_row(
                "SELECT level, message, session_id, model FROM logs ORDER BY id LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .unwrap()
    }

    #[test]
    fn persists_warn_and_above_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs.db");

        with_layer(&path, || {
            tracing::warn!("autosave failed");
            tracing::error!("stream broke");
            tracing::info!("player acted");
            tracing::debug!("chunk received");
        });

        assert_eq!(row_count(&path), 2);
    }

    #[test]
    fn event_fields_land_in_their_columns() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs.db");

        with_layer(&path, || {
            tracing::warn!(
                session_id = "sess_123",
                model = "qwen3-vl:4b",
                "retrying after error"
            );
        });

        let (level, message, session_id, model) = first_row(&path);
        assert_eq!(level, "WARN");
        assert_eq!(message, "retrying after error");
        assert_eq!(session_id.as_deref(), Some("sess_123"));
        assert_eq!(model.as_deref(), Some("qwen3-vl:4b"));
    }

    #[test]
    fn span_fields_inherited_by_events() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs.db");

        with_layer(&path, || {
            let span = tracing::warn_span!("session", session_id = "sess_abc");
            let _guard = span.enter();
            tracing::warn!("tts request failed");
        });

        let (_, message, session_id, _) = first_row(&path);
        assert_eq!(message, "tts request failed");
        assert_eq!(session_id.as_deref(), Some("sess_abc"));
    }

    #[test]
    fn display_recorded_fields_are_unquoted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logs.db");

        with_layer(&path, || {
            let id = String::from("sess_xyz");
            tracing::warn!(session_id = %id, "save rejected");
        });

        let (_, _, session_id, _) = first_row(&path);
        assert_eq!(session_id.as_deref(), Some("sess_xyz"));
    }
}
