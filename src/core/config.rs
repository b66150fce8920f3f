//! Client configuration and its one-time resolution.
//!
//! A [`ClientConfig`] holds what the caller chose explicitly. Resolving it applies
//! the defaults (credential from the environment, fixed default model) and yields a
//! [`ResolvedConfig`], which never changes afterwards.

use crate::provider::constants::openai;

use super::error::LlmError;
use super::http::{HttpClientConfig, InspectorConfig};

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub http_config: HttpClientConfig,
    pub inspector: Option<InspectorConfig>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_http_config(mut self, config: HttpClientConfig) -> Self {
        self.http_config = config;
        self
    }

    pub fn with_inspector(mut self, inspector: InspectorConfig) -> Self {
        self.inspector = Some(inspector);
        self
    }

    /// Resolve against the process environment.
    pub fn resolve(self) -> Result<ResolvedConfig, LlmError> {
        self.resolve_with(|name| std::env::var(name).ok())
    }

    /// Resolve using `lookup` in place of the process environment.
    ///
    /// Empty strings count as unset, both for explicit values and for the lookup.
    pub fn resolve_with<F>(self, lookup: F) -> Result<ResolvedConfig, LlmError>
    where
        F: FnOnce(&str) -> Option<String>,
    {
        let api_key = non_empty(self.api_key)
            .or_else(|| non_empty(lookup(openai::API_KEY_ENV_VAR)))
            .ok_or_else(|| {
                LlmError::ProviderConfiguration(format!(
                    "{} not set. Pass an API key explicitly or set the environment variable.",
                    openai::API_KEY_ENV_VAR
                ))
            })?;

        let model = non_empty(self.model).unwrap_or_else(|| openai::DEFAULT_MODEL.to_string());
        let base_url =
            non_empty(self.base_url).unwrap_or_else(|| openai::API_BASE.to_string());

        Ok(ResolvedConfig {
            api_key,
            model,
            base_url,
            http_config: self.http_config,
            inspector: self.inspector,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Configuration with every default applied. Fields are read-only.
#[derive(Clone)]
pub struct ResolvedConfig {
    api_key: String,
    model: String,
    base_url: String,
    http_config: HttpClientConfig,
    inspector: Option<InspectorConfig>,
}

impl ResolvedConfig {
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn http_config(&self) -> &HttpClientConfig {
        &self.http_config
    }

    pub fn inspector(&self) -> Option<&InspectorConfig> {
        self.inspector.as_ref()
    }
}

impl std::fmt::Debug for ResolvedConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedConfig")
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("http_config", &self.http_config)
            .field("inspector", &self.inspector)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_explicit_values_win() {
        let resolved = ClientConfig::new()
            .with_api_key("explicit-key")
            .with_model("gpt-4o-mini")
            .resolve_with(|_| Some("env-key".to_string()))
            .unwrap();

        assert_eq!(resolved.api_key(), "explicit-key");
        assert_eq!(resolved.model(), "gpt-4o-mini");
        assert_eq!(resolved.base_url(), "https://api.openai.com/v1");
    }

    #[test]
    fn test_defaults_applied() {
        let resolved = ClientConfig::new()
            .resolve_with(|name| {
                assert_eq!(name, "OPENAI_API_KEY");
                Some("env-key".to_string())
            })
            .unwrap();

        assert_eq!(resolved.api_key(), "env-key");
        assert_eq!(resolved.model(), "gpt-4o");
    }

    #[test]
    fn test_missing_credential_fails() {
        let result = ClientConfig::new().with_model("gpt-4o").resolve_with(no_env);
        match result {
            Err(LlmError::ProviderConfiguration(message)) => {
                assert!(message.contains("OPENAI_API_KEY"));
            }
            other => panic!("Expected ProviderConfiguration error, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let resolved = ClientConfig::new()
            .with_api_key("")
            .with_model("")
            .resolve_with(|_| Some("env-key".to_string()))
            .unwrap();
        assert_eq!(resolved.api_key(), "env-key");
        assert_eq!(resolved.model(), "gpt-4o");

        let result = ClientConfig::new().resolve_with(|_| Some(String::new()));
        assert!(matches!(result, Err(LlmError::ProviderConfiguration(_))));
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let resolved = ClientConfig::new()
            .with_api_key("sk-secret")
            .resolve_with(no_env)
            .unwrap();
        let debug = format!("{resolved:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
