use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::error::{Error, ProviderError, Result};
use crate::models::adapters::{error_from_response, http_client, AdapterSettings};
use crate::models::provider::{GeneratedContent, GenerationOptions, ProviderAdapter};

const DEFAULT_SIZE: u32 = 1024;

/// Keyless image generation over a plain GET.
pub struct PollinationsAdapter {
    client: Client,
    name: String,
    base_url: Url,
    default_model: String,
    models: Vec<String>,
}

impl PollinationsAdapter {
    pub fn new(settings: &AdapterSettings) -> Result<Self> {
        let base = settings.resolved_base()?;
        let base_url = Url::parse(&base)
            .map_err(|e| Error::validation(format!("Invalid api_base for {}: {}", settings.name, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::validation(format!("Invalid api_base for {}", settings.name)));
        }

        Ok(Self {
            client: http_client(settings.transport_timeout)?,
            name: settings.name.clone(),
            base_url,
            default_model: settings.default_model.clone(),
            models: settings.model_list(),
        })
    }

    fn image_url(&self, prompt: &str, options: &GenerationOptions) -> std::result::Result<Url, ProviderError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::malformed("base URL cannot take a path"))?
            .pop_if_empty()
            .push("prompt")
            .push(prompt);

        let (width, height, seed) = options
            .image_settings()
            .unwrap_or((DEFAULT_SIZE, DEFAULT_SIZE, None));

        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("width", &width.to_string())
                .append_pair("height", &height.to_string())
                .append_pair("model", &self.resolve_model(options.model.as_deref()))
                .append_pair("nologo", "true");
            if let Some(seed) = seed {
                query.append_pair("seed", &seed.to_string());
            }
        }

        Ok(url)
    }
}

#[async_trait]
impl ProviderAdapter for PollinationsAdapter {
    async fn invoke(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> std::result::Result<GeneratedContent, ProviderError> {
        let url = self.image_url(prompt, options)?;
        debug!("Requesting image from {}: {}", self.name, url.path());

        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(error_from_response(&self.name, response).await);
        }

        let mime_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if !mime_type.starts_with("image/") {
            return Err(ProviderError::malformed(format!(
                "expected an image, got content type '{}'",
                mime_type
            )));
        }

        let data = response.bytes().await?.to_vec();
        Ok(GeneratedContent::Binary { mime_type, data })
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
