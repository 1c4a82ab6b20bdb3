use std::collections::HashMap;
use std::env;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::domain::conversation::ConversationKey;
use crate::error::{Error, Result};
use crate::upstream::FlowUrl;

/// Maximum prompt length accepted from the host UI, in code points.
pub const MAX_INPUT_LENGTH: usize = 5000;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub api: ApiSettings,
    pub security: SecuritySettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiSettings {
    /// Conversation key (wire name) to flow endpoint URL.
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    pub timeouts: TimeoutSettings,
    pub auth: AuthSettings,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct TimeoutSettings {
    /// Connect timeout in seconds.
    pub connect: f64,
    /// Read timeout in seconds.
    pub read: f64,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AuthSettings {
    pub key: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SecuritySettings {
    pub max_requests_per_minute: u32,
    pub rate_window_secs: u64,
    pub session_timeout_minutes: i64,
    pub max_conversation_messages: usize,
}

impl Settings {
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with default values
            .set_default("api.timeouts.connect", 10.0)?
            .set_default("api.timeouts.read", 300.0)?
            .set_default("api.auth.key", None::<String>)?
            .set_default("security.max_requests_per_minute", 20)?
            .set_default("security.rate_window_secs", 60)?
            .set_default("security.session_timeout_minutes", 60)?
            .set_default("security.max_conversation_messages", 200)?
            // Add configuration file if it exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{environment}")).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Add environment variables with prefix
            .add_source(Environment::with_prefix("FLOWGATE").separator("__"))
            .build()?;

        config.try_deserialize()
    }

    /// Resolve the configured endpoint map into typed flow URLs.
    ///
    /// Fails fast unless every conversation key has a well-formed http(s)
    /// endpoint; the gateway refuses to construct on a partial map.
    pub fn validated_endpoints(&self) -> Result<HashMap<ConversationKey, FlowUrl>> {
        let mut endpoints = HashMap::new();
        for key in ConversationKey::ALL {
            let raw = self.api.endpoints.get(key.as_str()).ok_or_else(|| {
                Error::invalid_configuration(format!(
                    "missing endpoint for conversation key '{key}'"
                ))
            })?;
            let url = FlowUrl::try_new(raw.clone()).map_err(|e| {
                Error::invalid_configuration(format!(
                    "invalid endpoint for conversation key '{key}': {e}"
                ))
            })?;
            endpoints.insert(key, url);
        }
        Ok(endpoints)
    }
}
