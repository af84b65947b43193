//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may contain any subset of fields.

mod completion;
mod server;

pub use completion::*;
pub use server::*;

use serde::{Deserialize, Serialize};

/// Root settings type.
///
/// ```json
/// {
///   "completion": { "baseUrl": "https://api.deepseek.com/v1" },
///   "server": { "port": 9000 }
/// }
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NetarchSettings {
    /// Remote chat-completion service.
    pub completion: CompletionSettings,
    /// Conversation database location.
    pub storage: StorageSettings,
    /// HTTP surface.
    pub server: ServerSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_fills_defaults() {
        let settings: NetarchSettings =
            serde_json::from_str(r#"{"server": {"port": 9000}}"#).unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.completion.model, "deepseek-chat");
    }

    #[test]
    fn serialized_defaults_omit_api_key() {
        let mut settings = NetarchSettings::default();
        settings.completion.api_key = Some("sk-secret".into());
        let json = serde_json::to_string(&settings).unwrap();
        assert!(!json.contains("sk-secret"));
        assert!(json.contains("deepseek-chat"));
    }
}
