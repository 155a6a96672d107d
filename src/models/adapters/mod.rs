//! Concrete provider adapters.
//!
//! - [`OpenAiCompatibleAdapter`]: any `/chat/completions` API (Groq, OpenRouter, Cerebras, ...)
//! - [`GeminiAdapter`]: Google `generateContent`
//! - [`PollinationsAdapter`]: keyless image generation

pub mod gemini;
pub mod openai_compatible;
pub mod pollinations;

use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::error;

use crate::error::{Error, ProviderError, Result};
use crate::models::provider::ProviderAdapter;

pub use gemini::GeminiAdapter;
pub use openai_compatible::OpenAiCompatibleAdapter;
pub use pollinations::PollinationsAdapter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    OpenaiCompatible,
    Gemini,
    Pollinations,
}

impl ProviderKind {
    pub fn default_api_base(&self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenaiCompatible => None,
            ProviderKind::Gemini => Some("https://generativelanguage.googleapis.com/v1beta"),
            ProviderKind::Pollinations => Some("https://image.pollinations.ai"),
        }
    }

    pub fn requires_api_key(&self) -> bool {
        !matches!(self, ProviderKind::Pollinations)
    }
}

/// Everything an adapter needs to talk to its backend.
#[derive(Debug, Clone)]
pub struct AdapterSettings {
    pub name: String,
    pub kind: ProviderKind,
    pub api_base: Option<String>,
    pub api_key: Option<String>,
    pub default_model: String,
    pub models: Vec<String>,
    pub transport_timeout: Duration,
}

impl AdapterSettings {
    fn resolved_base(&self) -> Result<String> {
        self.api_base
            .clone()
            .or_else(|| self.kind.default_api_base().map(String::from))
            .map(|base| base.trim_end_matches('/').to_string())
            .ok_or_else(|| Error::validation(format!("Provider {} has no api_base", self.name)))
    }

    fn required_key(&self) -> Result<String> {
        match &self.api_key {
            Some(key) if !key.is_empty() => Ok(key.clone()),
            _ => Err(Error::ProviderUnavailable(self.name.clone())),
        }
    }

    /// Model list always contains the default model.
    fn model_list(&self) -> Vec<String> {
        let mut models = self.models.clone();
        if !models.contains(&self.default_model) {
            models.insert(0, self.default_model.clone());
        }
        models
    }
}

pub fn build_adapter(settings: &AdapterSettings) -> Result<Arc<dyn ProviderAdapter>> {
    let adapter: Arc<dyn ProviderAdapter> = match settings.kind {
        ProviderKind::OpenaiCompatible => Arc::new(OpenAiCompatibleAdapter::new(settings)?),
        ProviderKind::Gemini => Arc::new(GeminiAdapter::new(settings)?),
        ProviderKind::Pollinations => Arc::new(PollinationsAdapter::new(settings)?),
    };
    Ok(adapter)
}

pub(crate) fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(Error::from)
}

/// Turn a non-2xx response into a classified provider error.
pub(crate) async fn error_from_response(provider: &str, response: Response) -> ProviderError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    error!("{} API error: {} - {}", provider, status, body);
    ProviderError::from_status(status.as_u16(), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(kind: ProviderKind, api_key: Option<&str>) -> AdapterSettings {
        AdapterSettings {
            name: "test".to_string(),
            kind,
            api_base: Some("http://localhost:1/".to_string()),
            api_key: api_key.map(String::from),
            default_model: "model-a".to_string(),
            models: vec!["model-b".to_string()],
            transport_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_missing_key_is_unavailable() {
        let err = build_adapter(&settings(ProviderKind::OpenaiCompatible, None)).err().unwrap();
        assert!(matches!(err, Error::ProviderUnavailable(ref name) if name == "test"));

        let err = build_adapter(&settings(ProviderKind::Gemini, Some(""))).err().unwrap();
        assert!(matches!(err, Error::ProviderUnavailable(_)));
    }

    #[test]
    fn test_keyless_provider_builds() {
        let adapter = build_adapter(&settings(ProviderKind::Pollinations, None)).unwrap();
        assert_eq!(adapter.provider_name(), "test");
        assert_eq!(adapter.models(), &["model-a".to_string(), "model-b".to_string()]);
    }

    #[test]
    fn test_base_resolution() {
        let mut s = settings(ProviderKind::OpenaiCompatible, Some("k"));
        assert_eq!(s.resolved_base().unwrap(), "http://localhost:1");

        s.api_base = None;
        assert!(s.resolved_base().is_err());

        s.kind = ProviderKind::Gemini;
        assert!(s.resolved_base().unwrap().starts_with("https://generativelanguage"));
    }
}
