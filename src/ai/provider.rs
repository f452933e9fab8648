//! Maps a `(provider, credential)` pair to a request scoped model
//! client. Clients are built fresh for every request and never
//! cached, logged or persisted.

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ai::chat::Role;
use crate::anthropic::AnthropicClient;
use crate::core::AppConfig;
use crate::google::GeminiClient;
use crate::ollama::OllamaClient;
use crate::openai::OpenAiClient;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing provider or API key")]
    MissingCredential,
    #[error("Invalid provider")]
    InvalidProvider,
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    OpenAi,
    Anthropic,
    Google,
    Ollama,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::OpenAi,
        Provider::Anthropic,
        Provider::Google,
        Provider::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Google => "google",
            Provider::Ollama => "ollama",
        }
    }

    pub fn model_id(&self) -> &'static str {
        match self {
            Provider::OpenAi => "gpt-4o",
            Provider::Anthropic => "claude-3-5-sonnet-latest",
            Provider::Google => "gemini-2.5-flash",
            Provider::Ollama => "llama3.1",
        }
    }

    /// The local provider treats its credential as an optional base
    /// URL instead of a required API key.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, Provider::Ollama)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or(ValidationError::InvalidProvider)
    }
}

/// A message in the shape every vendor protocol can be built from.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelMessage {
    pub role: Role,
    pub content: String,
}

#[derive(Clone, Debug)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<ModelMessage>,
}

/// A model that can stream a completion as text deltas.
pub trait ChatModel: Send + Sync {
    fn provider(&self) -> Provider;

    fn model_id(&self) -> &str;

    /// Returns a lazy stream of text deltas in the order the provider
    /// emitted them. Nothing is sent until the stream is polled.
    fn stream(&self, request: ModelRequest) -> BoxStream<'static, Result<String>>;
}

pub enum ModelClient {
    OpenAi(OpenAiClient),
    Anthropic(AnthropicClient),
    Google(GeminiClient),
    Ollama(OllamaClient),
}

impl ChatModel for ModelClient {
    fn provider(&self) -> Provider {
        match self {
            ModelClient::OpenAi(_) => Provider::OpenAi,
            ModelClient::Anthropic(_) => Provider::Anthropic,
            ModelClient::Google(_) => Provider::Google,
            ModelClient::Ollama(_) => Provider::Ollama,
        }
    }

    fn model_id(&self) -> &str {
        match self {
            ModelClient::OpenAi(client) => client.model(),
            ModelClient::Anthropic(client) => client.model(),
            ModelClient::Google(client) => client.model(),
            ModelClient::Ollama(client) => client.model(),
        }
    }

    fn stream(&self, request: ModelRequest) -> BoxStream<'static, Result<String>> {
        match self {
            ModelClient::OpenAi(client) => client.completion_stream(request),
            ModelClient::Anthropic(client) => client.messages_stream(request),
            ModelClient::Google(client) => client.generate_stream(request),
            ModelClient::Ollama(client) => client.chat_stream(request),
        }
    }
}

// Written by hand so the credential can never end up in a log line
impl fmt::Debug for ModelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelClient")
            .field("provider", &self.provider())
            .field("model", &self.model_id())
            .finish()
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// Validates the request boundary and builds the client for it.
pub fn resolve(
    provider: Option<&str>,
    credential: Option<&str>,
    config: &AppConfig,
) -> Result<ModelClient, ValidationError> {
    let provider_name = non_blank(provider);
    let credential = non_blank(credential);

    if provider_name != Some(Provider::Ollama.as_str())
        && (provider_name.is_none() || credential.is_none())
    {
        return Err(ValidationError::MissingCredential);
    }

    let provider = provider_name
        .ok_or(ValidationError::MissingCredential)?
        .parse::<Provider>()?;
    let model = provider.model_id();

    tracing::debug!("Routing chat to {} ({})", provider, model);

    let client = match (provider, credential) {
        (Provider::OpenAi, Some(key)) => {
            ModelClient::OpenAi(OpenAiClient::new(&config.openai_api_hostname, key, model))
        }
        (Provider::Anthropic, Some(key)) => ModelClient::Anthropic(AnthropicClient::new(
            &config.anthropic_api_hostname,
            key,
            model,
        )),
        (Provider::Google, Some(key)) => {
            ModelClient::Google(GeminiClient::new(&config.google_api_hostname, key, model))
        }
        (Provider::Ollama, base_url) => ModelClient::Ollama(OllamaClient::new(
            base_url.unwrap_or(config.ollama_base_url.as_str()),
            model,
        )),
        (_, None) => return Err(ValidationError::MissingCredential),
    };

    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_unknown_provider() {
        let err = resolve(Some("bogus"), Some("key"), &AppConfig::default()).unwrap_err();
        assert_eq!(err, ValidationError::InvalidProvider);
        assert_eq!(err.to_string(), "Invalid provider");
    }

    #[test]
    fn test_resolve_rejects_missing_key() {
        let config = AppConfig::default();
        let err = resolve(Some("openai"), Some(""), &config).unwrap_err();
        assert_eq!(err, ValidationError::MissingCredential);
        assert_eq!(err.to_string(), "Missing provider or API key");

        assert_eq!(
            resolve(Some("anthropic"), None, &config).unwrap_err(),
            ValidationError::MissingCredential
        );
        assert_eq!(
            resolve(Some("google"), Some("   "), &config).unwrap_err(),
            ValidationError::MissingCredential
        );
        assert_eq!(
            resolve(None, Some("key"), &config).unwrap_err(),
            ValidationError::MissingCredential
        );
        // Missing credential is checked before the provider name
        assert_eq!(
            resolve(Some("bogus"), None, &config).unwrap_err(),
            ValidationError::MissingCredential
        );
    }

    #[test]
    fn test_resolve_fixed_models() {
        let config = AppConfig::default();
        let cases = [
            ("openai", "gpt-4o"),
            ("anthropic", "claude-3-5-sonnet-latest"),
            ("google", "gemini-2.5-flash"),
            ("ollama", "llama3.1"),
        ];
        for (name, model) in cases {
            let client = resolve(Some(name), Some("sk-test"), &config).unwrap();
            assert_eq!(client.provider().as_str(), name);
            assert_eq!(client.model_id(), model);
        }
    }

    #[test]
    fn test_resolve_ollama_without_credential() {
        let client = resolve(Some("ollama"), None, &AppConfig::default()).unwrap();
        match client {
            ModelClient::Ollama(c) => assert_eq!(c.base_url(), "http://localhost:11434/api"),
            other => panic!("Unexpected client {:?}", other),
        }
    }

    #[test]
    fn test_resolve_ollama_credential_is_base_url() {
        let client = resolve(
            Some("ollama"),
            Some("http://gpu-box:11434/api/"),
            &AppConfig::default(),
        )
        .unwrap();
        match client {
            ModelClient::Ollama(c) => assert_eq!(c.base_url(), "http://gpu-box:11434/api"),
            other => panic!("Unexpected client {:?}", other),
        }
    }

    #[test]
    fn test_debug_does_not_leak_credential() {
        let client = resolve(Some("openai"), Some("sk-secret"), &AppConfig::default()).unwrap();
        let debug = format!("{:?}", client);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("gpt-4o"));
    }

    #[test]
    fn test_provider_serialization() {
        assert_eq!(
            serde_json::to_string(&Provider::OpenAi).unwrap(),
            r#""openai""#
        );
        assert_eq!(
            serde_json::from_str::<Provider>(r#""ollama""#).unwrap(),
            Provider::Ollama
        );
        assert_eq!("google".parse::<Provider>(), Ok(Provider::Google));
        assert_eq!("Google".parse::<Provider>(), Err(ValidationError::InvalidProvider));
    }
}
