// Provider selection: builds a ChatClient from configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::traits::ChatClient;
use crate::{GeminiClient, OpenAIClient};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    OpenAI,
    Gemini,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub provider: ProviderType,
    pub api_key: String,
    /// Overrides the provider's default API base (OpenAI-compatible gateways, proxies)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProviderConfig {
    pub fn openai(api_key: impl Into<String>) -> Self {
        Self {
            provider: ProviderType::OpenAI,
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn gemini(api_key: impl Into<String>) -> Self {
        Self {
            provider: ProviderType::Gemini,
            api_key: api_key.into(),
            base_url: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }
}

/// Factory for creating chat clients from configuration
pub struct ClientFactory;

impl ClientFactory {
    pub fn create_chat_client(config: ProviderConfig) -> Result<Arc<dyn ChatClient>> {
        let base_url = config.base_url.filter(|u| !u.trim().is_empty());
        match config.provider {
            ProviderType::OpenAI => {
                let mut client = OpenAIClient::new(config.api_key)?;
                if let Some(url) = base_url {
                    client = client.with_base_url(url);
                }
                Ok(Arc::new(client))
            }
            ProviderType::Gemini => {
                let mut client = GeminiClient::new(config.api_key)?;
                if let Some(url) = base_url {
                    client = client.with_base_url(url);
                }
                Ok(Arc::new(client))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_from_config_text() {
        let config: ProviderConfig =
            serde_json::from_str(r#"{"provider":"gemini","api_key":"k"}"#).unwrap();
        assert_eq!(config.provider, ProviderType::Gemini);
        assert!(config.base_url.is_none());
    }

    #[test]
    fn test_factory_builds_both_providers() {
        assert!(ClientFactory::create_chat_client(ProviderConfig::openai("k")).is_ok());
        assert!(ClientFactory::create_chat_client(
            ProviderConfig::gemini("k").with_base_url("http://localhost:1234/v1beta")
        )
        .is_ok());
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(ClientFactory::create_chat_client(ProviderConfig::openai("bad\nkey")).is_err());
    }
}
