//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`NetarchSettings::default()`]
//! 2. If the settings file exists, deep-merge its values over the defaults
//! 3. Apply environment variable overrides (highest priority)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::NetarchSettings;

/// Resolve the settings file: `$NETARCH_SETTINGS`, else `~/.netarch/settings.json`.
pub fn settings_path() -> PathBuf {
    if let Some(explicit) = read_env_string("NETARCH_SETTINGS") {
        return PathBuf::from(explicit);
    }
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".netarch").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<NetarchSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults; invalid JSON is an error.
pub fn load_settings_from_path(path: &Path) -> Result<NetarchSettings> {
    let mut settings = load_file_layer(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults merged with the file at `path`, without env overrides.
pub fn load_file_layer(path: &Path) -> Result<NetarchSettings> {
    let defaults = serde_json::to_value(NetarchSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply process environment overrides to loaded settings.
pub fn apply_env_overrides(settings: &mut NetarchSettings) {
    apply_overrides_from(settings, |name| std::env::var(name).ok());
}

/// Apply overrides read through `lookup`. Invalid values are logged and ignored.
pub fn apply_overrides_from<F>(settings: &mut NetarchSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let string = |name: &str| lookup(name).filter(|v| !v.is_empty());

    // ── Completion service ──────────────────────────────────────────
    if let Some(v) = string("AI_API_KEY") {
        settings.completion.api_key = Some(v);
    }
    if let Some(v) = string("AI_BASE_URL") {
        settings.completion.base_url = Some(v);
    }
    if let Some(v) = string("AI_MODEL") {
        settings.completion.model = v;
    }
    if let Some(v) = string("AI_IDLE_TIMEOUT_MS") {
        match parse_u64_range(&v, 1_000, 3_600_000) {
            Some(ms) => settings.completion.idle_timeout_ms = ms,
            None => warn_invalid("AI_IDLE_TIMEOUT_MS", &v),
        }
    }

    // ── Storage ─────────────────────────────────────────────────────
    if let Some(v) = string("NETARCH_DB_PATH") {
        settings.storage.db_path = v;
    }

    // ── Server ──────────────────────────────────────────────────────
    if let Some(v) = string("NETARCH_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = string("NETARCH_PORT") {
        match parse_u16_range(&v, 1, 65535) {
            Some(port) => settings.server.port = port,
            None => warn_invalid("NETARCH_PORT", &v),
        }
    }
    if let Some(v) = string("NETARCH_SESSION_IDLE_TIMEOUT_MS") {
        match parse_u64_range(&v, 60_000, 7 * 24 * 3_600_000) {
            Some(ms) => settings.server.session_idle_timeout_ms = ms,
            None => warn_invalid("NETARCH_SESSION_IDLE_TIMEOUT_MS", &v),
        }
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = string("NETARCH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = string("NETARCH_LOG_TO_SQLITE") {
        match parse_bool(&v) {
            Some(b) => settings.logging.log_to_sqlite = b,
            None => warn_invalid("NETARCH_LOG_TO_SQLITE", &v),
        }
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn warn_invalid(name: &str, value: &str) {
    tracing::warn!(key = name, value = %value, "invalid env var, ignoring");
}
