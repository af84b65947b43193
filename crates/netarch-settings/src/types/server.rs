//! Storage, server, and logging settings.

use serde::{Deserialize, Serialize};

/// Conversation database location.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// SQLite file path, relative to the working directory unless absolute.
    pub db_path: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            db_path: "netarchitect.db".to_string(),
        }
    }
}

/// HTTP surface settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerSettings {
    /// Bind address.
    pub host: String,
    pub port: u16,
    /// Upper bound on a single request, generation included.
    pub request_timeout_ms: u64,
    /// Browser sessions untouched for this long are closed.
    pub session_idle_timeout_ms: u64,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
            request_timeout_ms: 300_000,
            session_idle_timeout_ms: 4 * 3_600_000,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level when `RUST_LOG` is unset.
    pub level: String,
    /// Persist warn+ records to a SQLite log database.
    pub log_to_sqlite: bool,
    pub log_db_path: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_to_sqlite: false,
            log_db_path: "netarchitect-logs.db".to_string(),
        }
    }
}
