//! Declarative client configuration.
//!
//! Mirrors what deployments put in their config files: credentials, an
//! optional gateway base URL, and the resilience knobs worth exposing.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::client::LlmClient;
use crate::deadline::DEFAULT_TIMEOUT_MS;
use crate::error::LlmError;
use crate::http::DynHttpTransport;
use crate::provider::anthropic::AnthropicProvider;
use crate::retry::RetryConfig;

/// Serializable client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_key: String,
    /// Gateway or proxy base URL; the provider default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Per-call deadline in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Overrides the default retry count when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

impl ClientConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_retries: None,
        }
    }

    /// Checks the settings before any network use.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Validation`] for a blank API key.
    pub fn validate(&self) -> Result<(), LlmError> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::validation("api_key must not be empty"));
        }
        Ok(())
    }

    /// Builds a ready-to-use client over the given transport.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Validation`] when the settings are invalid.
    pub fn build_client(&self, transport: DynHttpTransport) -> Result<LlmClient, LlmError> {
        self.validate()?;
        let mut provider = AnthropicProvider::new(transport, self.api_key.clone());
        if let Some(base_url) = &self.base_url {
            provider = provider.with_base_url(base_url);
        }
        let mut retry = RetryConfig::default();
        if let Some(max_retries) = self.max_retries {
            retry.max_retries = max_retries;
        }
        Ok(LlmClient::new(Arc::new(provider))
            .with_timeout(Duration::from_millis(self.timeout_ms))
            .with_retry_config(retry))
    }
}
