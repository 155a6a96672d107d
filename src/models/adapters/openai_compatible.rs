use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

use crate::error::{ProviderError, Result};
use crate::models::adapters::{error_from_response, http_client, AdapterSettings};
use crate::models::provider::{
    GeneratedContent, GenerationOptions, ProviderAdapter, ProviderExtension,
};

/// Adapter for any OpenAI-style `/chat/completions` endpoint.
pub struct OpenAiCompatibleAdapter {
    client: Client,
    name: String,
    api_key: String,
    base_url: String,
    default_model: String,
    models: Vec<String>,
}

impl OpenAiCompatibleAdapter {
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

    fn build_request(&self, prompt: &str, options: &GenerationOptions) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = options.system_prompt.as_deref().filter(|s| !s.is_empty()) {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: prompt.to_string(),
        });

        let mut request = ChatCompletionRequest {
            model: self.resolve_model(options.model.as_deref()),
            messages,
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            stream: false,
            stop: None,
            frequency_penalty: None,
            presence_penalty: None,
        };

        if let Some(ProviderExtension::Sampling {
            stop,
            frequency_penalty,
            presence_penalty,
        }) = &options.extension
        {
            if !stop.is_empty() {
                request.stop = Some(stop.clone());
            }
            request.frequency_penalty = *frequency_penalty;
            request.presence_penalty = *presence_penalty;
        }

        request
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    async fn invoke(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> std::result::Result<GeneratedContent, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = self.build_request(prompt, options);

        debug!("Sending request to {}: model={}", self.name, request.model);
        let start_time = Instant::now();

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(&self.name, response).await);
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(format!("Failed to parse response: {}", e)))?;

        debug!("{} request completed in {:?}", self.name, start_time.elapsed());

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ProviderError::malformed("No choices in response"))?;

        Ok(GeneratedContent::Text(content))
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
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    frequency_penalty: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    presence_penalty: Option<f32>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}
