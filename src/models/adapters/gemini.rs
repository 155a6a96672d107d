use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::models::adapters::{error_from_response, http_client, AdapterSettings};
use crate::models::provider::{GeneratedContent, GenerationOptions, ProviderAdapter};

pub struct GeminiAdapter {
    client: Client,
    name: String,
    api_key: String,
    base_url: String,
    default_model: String,
    models: Vec<String>,
}

impl GeminiAdapter {
    pub fn new(settings: &AdapterSettings) -> Result<Self> {
        Ok(Self {
            client: http_client(settings.transport_timeout)?,
            name: settings.name.clone(),
            api_key: settings.required_key()?,
            base_url: settings.resolved_base()?,
            default_model: settings.default_model.clone(),
            models: settings.model_list(),
        })
    }

    fn build_request(prompt: &str, options: &GenerationOptions) -> GeminiRequest {
        GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".to_string()),
                parts: vec![GeminiPart {
                    text: prompt.to_string(),
                }],
            }],
            system_instruction: options
                .system_prompt
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|system| GeminiContent {
                    role: None,
                    parts: vec![GeminiPart {
                        text: system.to_string(),
                    }],
                }),
            generation_config: GeminiGenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
                top_p: options.top_p,
            },
        }
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    async fn invoke(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> std::result::Result<GeneratedContent, ProviderError> {
        let model = self.resolve_model(options.model.as_deref());
        let url = format!("{}/models/{}:generateContent", self.base_url, model);

        debug!("Sending request to Gemini: model={}", model);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&Self::build_request(prompt, options))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(&self.name, response).await);
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("Failed to parse response: {}", e)))?;

        let text = body
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate
                    .content
                    .parts
                    .into_iter()
                    .map(|part| part.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .ok_or_else(|| ProviderError::malformed("No candidates in response"))?;

        Ok(GeneratedContent::Text(text))
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn models(&self) -> &[String] {
        &self.models
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}
