use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use tracing::field::{Field, Visit};
use tracing::span;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// A warn+ log record persisted to SQLite.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogRecord {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub target: String,
    pub message: String,
    /// Remaining event fields as a JSON object.
    pub fields: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<i64>,
}

/// Filters for [`SqliteLogSink::query`]. Unset fields match everything.
#[derive(Clone, Debug, Default)]
pub struct LogQuery {
    pub level: Option<String>,
    /// Substring of the event target, e.g. `"netarch_llm"`.
    pub target: Option<String>,
    pub session_id: Option<String>,
    pub user_id: Option<i64>,
    /// RFC 3339 lower bound on the timestamp.
    pub since: Option<String>,
    pub limit: Option<u32>,
}

const LOG_SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
CREATE TABLE IF NOT EXISTS logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    level TEXT NOT NULL,
    target TEXT NOT NULL,
    message TEXT NOT NULL,
    fields TEXT,
    session_id TEXT,
    user_id INTEGER
);
CREATE INDEX IF NOT EXISTS idx_logs_level ON logs(level);
CREATE INDEX IF NOT EXISTS idx_logs_session ON logs(session_id);
CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
";

/// SQLite sink holding warn+ records, separate from the tutor database.
pub struct SqliteLogSink {
    conn: Mutex<Connection>,
}

impl SqliteLogSink {
    pub fn new(db_path: &Path) -> Result<Self, rusqlite::Error> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(LOG_SCHEMA)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn insert(&self, entry: &Identity, level: &str, target: &str, message: &str, fields: Option<String>) {
        let conn = self.conn.lock();
        let _ = conn.execute(
            "INSERT INTO logs (timestamp, level, target, message, fields, session_id, user_id)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            rusqlite::params![
                Utc::now().to_rfc3339(),
                level,
                target,
                message,
                fields,
                entry.session_id,
                entry.user_id,
            ],
        );
    }

    pub fn query(&self, q: &LogQuery) -> Result<Vec<LogRecord>, rusqlite::Error> {
        let mut clauses = Vec::new();
        let mut args: Vec<rusqlite::types::Value> = Vec::new();

        if let Some(level) = &q.level {
            args.push(level.clone().into());
            clauses.push(format!("level = ?{}", args.len()));
        }
        if let Some(target) = &q.target {
            args.push(format!("%{target}%").into());
            clauses.push(format!("target LIKE ?{}", args.len()));
        }
        if let Some(session_id) = &q.session_id {
            args.push(session_id.clone().into());
            clauses.push(format!("session_id = ?{}", args.len()));
        }
        if let Some(user_id) = q.user_id {
            args.push(user_id.into());
            clauses.push(format!("user_id = ?{}", args.len()));
        }
        if let Some(since) = &q.since {
            args.push(since.clone().into());
            clauses.push(format!("timestamp >= ?{}", args.len()));
        }

        let mut sql = String::from(
            "SELECT id, timestamp, level, target, message, fields, session_id, user_id FROM logs",
        );
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY id DESC LIMIT {}", q.limit.unwrap_or(100)));

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args), |row| {
            Ok(LogRecord {
                id: row.get(0)?,
                timestamp: row.get(1)?,
                level: row.get(2)?,
                target: row.get(3)?,
                message: row.get(4)?,
                fields: row.get(5)?,
                session_id: row.get(6)?,
                user_id: row.get(7)?,
            })
        })?;
        rows.collect()
    }

    pub fn count(&self) -> Result<i64, rusqlite::Error> {
        let conn = self.conn.lock();
        conn.query_row("SELECT COUNT(*) FROM logs", [], |row| row.get(0))
    }
}

/// Who an event belongs to, gathered from the event or its enclosing spans.
#[derive(Clone, Debug, Default)]
struct Identity {
    session_id: Option<String>,
    user_id: Option<i64>,
}

impl Identity {
    fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.user_id.is_some()
    }

    fn fill_from(&mut self, other: &Identity) {
        if self.session_id.is_none() {
            self.session_id.clone_from(&other.session_id);
        }
        if self.user_id.is_none() {
            self.user_id = other.user_id;
        }
    }
}

/// tracing Layer that writes warn+ events to a [`SqliteLogSink`].
pub struct SqliteLogLayer {
    sink: Arc<SqliteLogSink>,
}

impl SqliteLogLayer {
    pub fn new(sink: Arc<SqliteLogSink>) -> Self {
        Self { sink }
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: serde_json::Map<String, serde_json::Value>,
    identity: Identity,
}

impl FieldVisitor {
    fn store(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        match field.name() {
            "message" => self.message = Some(rendered),
            "session_id" => self.identity.session_id = Some(rendered.trim_matches('"').to_string()),
            "user_id" => match rendered.parse() {
                Ok(id) => self.identity.user_id = Some(id),
                Err(_) => self.store(field, rendered.into()),
            },
            _ => self.store(field, rendered.into()),
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            "session_id" => self.identity.session_id = Some(value.to_string()),
            _ => self.store(field, value.into()),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == "user_id" {
            self.identity.user_id = Some(value);
        } else {
            self.store(field, value.into());
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match (field.name(), i64::try_from(value)) {
            ("user_id", Ok(id)) => self.identity.user_id = Some(id),
            _ => self.store(field, value.into()),
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        if let Some(n) = serde_json::Number::from_f64(value) {
            self.store(field, serde_json::Value::Number(n));
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.store(field, value.into());
    }
}

impl<S> Layer<S> for SqliteLogLayer
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if level > tracing::Level::WARN {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        if !visitor.identity.is_complete() {
            if let Some(scope) = ctx.event_scope(event) {
                for span in scope {
                    if let Some(found) = span.extensions().get::<Identity>() {
                        visitor.identity.fill_from(found);
                    }
                }
            }
        }

        let fields = (!visitor.fields.is_empty())
            .then(|| serde_json::to_string(&visitor.fields).unwrap_or_default());

        self.sink.insert(
            &visitor.identity,
            &level.to_string().to_uppercase(),
            event.metadata().target(),
            visitor.message.as_deref().unwrap_or_default(),
            fields,
        );
    }

    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        attrs.record(&mut visitor);

        let identity = visitor.identity;
        if identity.session_id.is_some() || identity.user_id.is_some() {
            if let Some(span) = ctx.span(id) {
                span.extensions_mut().insert(identity);
            }
        }
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        values.record(&mut visitor);
        if visitor.identity.session_id.is_none() && visitor.identity.user_id.is_none() {
            return;
        }
        if let Some(span) = ctx.span(id) {
            let mut extensions = span.extensions_mut();
            match extensions.get_mut::<Identity>() {
                Some(existing) => {
                    let mut merged = visitor.identity;
                    merged.fill_from(existing);
                    *existing = merged;
                }
                None => extensions.insert(visitor.identity),
            }
        }
    }
}
