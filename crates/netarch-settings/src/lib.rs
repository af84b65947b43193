//! # netarch-settings
//!
//! Configuration for the NetArchitect tutor, loaded from three layers (in
//! priority order):
//! 1. **Compiled defaults** ([`NetarchSettings::default()`])
//! 2. **User file** `~/.netarch/settings.json`, deep-merged over defaults
//! 3. **Environment variables** (`AI_*`, `NETARCH_*`), highest priority
//!
//! The completion credentials are checked once at startup with
//! [`CompletionSettings::validate`]; a failure there is fatal.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_values() {
        let settings = NetarchSettings::default();
        assert_eq!(settings.completion.model, "deepseek-chat");
        assert!(settings.completion.api_key.is_none());
        assert_eq!(settings.storage.db_path, "netarchitect.db");
        assert_eq!(settings.server.port, 8501);
        assert_eq!(settings.logging.level, "info");
    }

    #[test]
    fn deep_merge_re_exported() {
        let a = serde_json::json!({"x": 1});
        let b = serde_json::json!({"y": 2});
        let merged = deep_merge(a, b);
        assert_eq!(merged["x"], 1);
        assert_eq!(merged["y"], 2);
    }
}
