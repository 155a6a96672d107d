use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, ProviderError};

/// Uniform call shape every backend implements.
///
/// Adapters own their wire schema and error classification; the
/// orchestrator only sees [`GeneratedContent`] or a [`ProviderError`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    async fn invoke(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> std::result::Result<GeneratedContent, ProviderError>;

    fn provider_name(&self) -> &str;

    fn default_model(&self) -> &str;

    fn models(&self) -> &[String];

    /// The requested model when this adapter serves it, otherwise the default.
    fn resolve_model(&self, requested: Option<&str>) -> String {
        match requested {
            Some(model) if self.models().iter().any(|m| m == model) => model.to_string(),
            _ => self.default_model().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
    Audio,
    Multimodal,
}

impl Modality {
    /// Multimodal providers serve every request kind.
    pub fn serves(&self, requested: Modality) -> bool {
        *self == requested || *self == Modality::Multimodal
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
            Modality::Multimodal => "multimodal",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Modality::Text),
            "image" => Ok(Modality::Image),
            "audio" => Ok(Modality::Audio),
            "multimodal" => Ok(Modality::Multimodal),
            other => Err(Error::validation(format!("Unknown modality: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub model: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub stream: bool,
    pub extension: Option<ProviderExtension>,
}

impl GenerationOptions {
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_extension(mut self, extension: ProviderExtension) -> Self {
        self.extension = Some(extension);
        self
    }

    /// Reject NaN and infinite sampling values. They serialize as JSON
    /// null and would share a cache key with an unset value.
    pub fn validate_sampling(&self) -> Result<(), Error> {
        let mut values = vec![("temperature", self.temperature), ("top_p", self.top_p)];
        if let Some(ProviderExtension::Sampling {
            frequency_penalty,
            presence_penalty,
            ..
        }) = &self.extension
        {
            values.push(("frequency_penalty", *frequency_penalty));
            values.push(("presence_penalty", *presence_penalty));
        }

        for (name, value) in values {
            if let Some(value) = value.filter(|v| !v.is_finite()) {
                return Err(Error::validation(format!("{} must be finite, got {}", name, value)));
            }
        }
        Ok(())
    }

    pub fn image_settings(&self) -> Option<(u32, u32, Option<u64>)> {
        match &self.extension {
            Some(ProviderExtension::Image { width, height, seed }) => Some((*width, *height, *seed)),
            _ => None,
        }
    }
}

/// Provider-specific knobs that do not fit the common option set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderExtension {
    Sampling {
        #[serde(default)]
        stop: Vec<String>,
        frequency_penalty: Option<f32>,
        presence_penalty: Option<f32>,
    },
    Image {
        width: u32,
        height: u32,
        seed: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratedContent {
    Text(String),
    Binary { mime_type: String, data: Vec<u8> },
}

impl GeneratedContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            GeneratedContent::Text(text) => Some(text),
            GeneratedContent::Binary { .. } => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            GeneratedContent::Text(text) => text.trim().is_empty(),
            GeneratedContent::Binary { data, .. } => data.is_empty(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResponse {
    pub id: String,
    pub provider: String,
    pub model: String,
    pub content: GeneratedContent,
    pub latency_ms: u64,
    pub created_at: DateTime<Utc>,
    pub cached: bool,
}
