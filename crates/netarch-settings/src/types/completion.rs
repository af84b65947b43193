//! Chat-completion service settings and startup validation.

use std::fmt;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Version suffix the base URL must carry.
pub const REQUIRED_URL_SUFFIX: &str = "/v1";

/// Settings for the OpenAI-compatible completion endpoint.
///
/// The API key is accepted from the file but never written back out.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompletionSettings {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Base URL ending in `/v1`, e.g. `https://api.deepseek.com/v1`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub model: String,
    /// Sampling temperature for diagnosis feedback.
    pub diagnose_temperature: f64,
    pub connect_timeout_ms: u64,
    /// Abort a stream when no bytes arrive for this long.
    pub idle_timeout_ms: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model: "deepseek-chat".to_string(),
            diagnose_temperature: 0.4,
            connect_timeout_ms: 10_000,
            idle_timeout_ms: 120_000,
        }
    }
}

impl fmt::Debug for CompletionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("diagnose_temperature", &self.diagnose_temperature)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("idle_timeout_ms", &self.idle_timeout_ms)
            .finish()
    }
}

/// Completion settings that passed [`CompletionSettings::validate`].
#[derive(Clone, Debug)]
pub struct ValidatedCompletion {
    pub api_key: SecretString,
    /// Base URL with any trailing slash removed.
    pub base_url: String,
    pub model: String,
    pub diagnose_temperature: f64,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl CompletionSettings {
    /// Check credentials before anything is served.
    pub fn validate(&self) -> Result<ValidatedCompletion> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(SettingsError::MissingCredential { name: "AI_API_KEY" })?;

        let raw_url = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(SettingsError::MissingCredential { name: "AI_BASE_URL" })?;

        let base_url = raw_url.trim_end_matches('/');
        if !base_url.ends_with(REQUIRED_URL_SUFFIX) {
            return Err(SettingsError::InvalidValue(format!(
                "AI_BASE_URL must end with {REQUIRED_URL_SUFFIX} (got {raw_url}); \
                 for example https://api.deepseek.com/v1"
            )));
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(SettingsError::InvalidValue(format!(
                "AI_BASE_URL must be an http(s) URL (got {raw_url})"
            )));
        }
        if self.model.trim().is_empty() {
            return Err(SettingsError::InvalidValue("completion model must not be empty".into()));
        }

        Ok(ValidatedCompletion {
            api_key: SecretString::from(api_key.to_string()),
            base_url: base_url.to_string(),
            model: self.model.clone(),
            diagnose_temperature: self.diagnose_temperature,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            idle_timeout: Duration::from_millis(self.idle_timeout_ms),
        })
    }
}
