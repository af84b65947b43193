/// SQL DDL for the tutor database.
/// WAL mode + foreign keys enabled at connection time.
pub const SCHEMA_VERSION: u32 = 1;

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    username TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL REFERENCES users(id),
    module TEXT NOT NULL CHECK (module IN ('diagnosis', 'task', 'inquiry')),
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    solution TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_conversations_owner
    ON conversations(user_id, module, created_at);

CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);
"#;

/// Databases written by the earlier tutor tagged modules `s1`/`s3`.
pub const RENAME_LEGACY_MODULES: &str = r#"
UPDATE conversations SET module = 'diagnosis' WHERE module = 's1';
UPDATE conversations SET module = 'task' WHERE module = 's3';
"#;

pub const PRAGMAS: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;
PRAGMA busy_timeout = 5000;
PRAGMA synchronous = NORMAL;
"#;
