//! Environment-backed settings source.

use crate::{
    config::{ProviderSettings, SettingsError, SettingsProvider, DEFAULT_GRAPH_API_VERSION},
    SecretString,
};
use async_trait::async_trait;
use std::env;

/// Environment variable holding the handshake verify token.
pub const VERIFY_TOKEN_VAR: &str = "META_VERIFY_TOKEN";

/// Environment variable holding the webhook app secret.
pub const APP_SECRET_VAR: &str = "META_APP_SECRET";

/// Environment variable holding the page access token.
pub const ACCESS_TOKEN_VAR: &str = "META_PAGE_ACCESS_TOKEN";

/// Environment variable overriding the Graph API version.
pub const GRAPH_API_VERSION_VAR: &str = "META_GRAPH_API_VERSION";

/// Settings provider reading the `META_*` environment variables.
///
/// Variables are read at call time, not construction time, so values rotated
/// in the process environment take effect on the next request.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl EnvSettings {
    /// Create the provider.
    pub fn new() -> Self {
        Self
    }

    fn secret_var(name: &str) -> Option<SecretString> {
        env::var(name)
            .ok()
            .filter(|value| !value.is_empty())
            .map(SecretString::from_string)
    }
}

#[async_trait]
impl SettingsProvider for EnvSettings {
    async fn current(&self) -> Result<ProviderSettings, SettingsError> {
        let graph_api_version = env::var(GRAPH_API_VERSION_VAR)
            .ok()
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_GRAPH_API_VERSION.to_string());

        Ok(ProviderSettings {
            verify_token: Self::secret_var(VERIFY_TOKEN_VAR),
            app_secret: Self::secret_var(APP_SECRET_VAR),
            access_token: Self::secret_var(ACCESS_TOKEN_VAR),
            graph_api_version,
        })
    }
}

#[cfg(test)]
#[path = "env_settings_tests.rs"]
mod tests;
