use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::models::adapters::{AdapterSettings, ProviderKind};
use crate::models::orchestrator::OrchestratorConfig;
use crate::models::provider::Modality;
use crate::models::rate_limiter::RateBudget;
use crate::models::registry::ProviderSpec;

const ENV_PREFIX: &str = "FREEROUTE";

/// Extra slack on the HTTP client so the orchestrator timeout fires first.
const TRANSPORT_TIMEOUT_SLACK: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub orchestrator: OrchestratorSection,
    pub cache: CacheSection,
    pub providers: BTreeMap<String, ProviderConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub request_timeout_secs: u64,
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    pub default_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    pub enabled: bool,
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_modality")]
    pub modality: Modality,
    #[serde(default)]
    pub priority: i32, // lower is tried first
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub api_base: Option<String>,
    pub default_model: String,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_secs: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_modality() -> Modality {
    Modality::Text
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            failure_threshold: 5,
            cooldown_secs: 300,
            default_model: None,
        }
    }
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: 3600,
            sweep_interval_secs: 300,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: 60,
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    pub fn to_budget(self) -> RateBudget {
        RateBudget::new(self.requests, Duration::from_secs(self.window_secs))
    }
}

impl ProviderConfig {
    fn openai_compatible(
        api_base: &str,
        api_key_env: &str,
        default_model: &str,
        models: &[&str],
        priority: i32,
        requests_per_minute: u32,
    ) -> Self {
        Self {
            kind: ProviderKind::OpenaiCompatible,
            enabled: true,
            modality: Modality::Text,
            priority,
            api_key_env: Some(api_key_env.to_string()),
            api_base: Some(api_base.to_string()),
            default_model: default_model.to_string(),
            models: models.iter().map(|m| m.to_string()).collect(),
            rate_limit: RateLimitConfig {
                requests: requests_per_minute,
                window_secs: 60,
            },
        }
    }

    pub fn to_spec(&self, name: &str) -> ProviderSpec {
        ProviderSpec::new(name, self.modality, self.priority, self.rate_limit.to_budget())
    }
}

/// Free-tier providers shipped in a fresh configuration.
pub fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();

    providers.insert(
        "groq".to_string(),
        ProviderConfig::openai_compatible(
            "https://api.groq.com/openai/v1",
            "GROQ_API_KEY",
            "llama-3.1-8b-instant",
            &["llama-3.3-70b-versatile", "gemma2-9b-it"],
            10,
            30,
        ),
    );

    providers.insert(
        "openrouter".to_string(),
        ProviderConfig::openai_compatible(
            "https://openrouter.ai/api/v1",
            "OPENROUTER_API_KEY",
            "meta-llama/llama-3.1-8b-instruct:free",
            &["mistralai/mistral-7b-instruct:free"],
            20,
            20,
        ),
    );

    providers.insert(
        "cerebras".to_string(),
        ProviderConfig::openai_compatible(
            "https://api.cerebras.ai/v1",
            "CEREBRAS_API_KEY",
            "llama3.1-8b",
            &["llama-3.3-70b"],
            30,
            30,
        ),
    );

    providers.insert(
        "gemini".to_string(),
        ProviderConfig {
            kind: ProviderKind::Gemini,
            enabled: true,
            modality: Modality::Text,
            priority: 40,
            api_key_env: Some("GEMINI_API_KEY".to_string()),
            api_base: None,
            default_model: "gemini-1.5-flash".to_string(),
            models: vec!["gemini-1.5-pro".to_string()],
            rate_limit: RateLimitConfig {
                requests: 15,
                window_secs: 60,
            },
        },
    );

    providers.insert(
        "pollinations".to_string(),
        ProviderConfig {
            kind: ProviderKind::Pollinations,
            enabled: true,
            modality: Modality::Image,
            priority: 10,
            api_key_env: None,
            api_base: None,
            default_model: "flux".to_string(),
            models: vec!["turbo".to_string()],
            rate_limit: RateLimitConfig {
                requests: 10,
                window_secs: 60,
            },
        },
    );

    providers
}

impl AppConfig {
    /// Configuration with the default provider set.
    pub fn with_default_providers() -> Self {
        Self {
            providers: default_providers(),
            ..Self::default()
        }
    }

    /// Load from `path`, layering `FREEROUTE_*` environment overrides on top.
    /// A missing file is created with defaults first.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            info!("Config file not found, creating default configuration");
            Self::with_default_providers().save(path).await?;
        }

        info!("Loading configuration from: {:?}", path);

        let settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Toml))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: AppConfig = settings.try_deserialize()?;
        config.validate()?;

        debug!("Configuration loaded with {} providers", config.providers.len());
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        info!("Saving configuration to: {:?}", path);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(config::ConfigError::Message(e.to_string())))?;
        fs::write(path, content).await?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.orchestrator.request_timeout_secs == 0 {
            return Err(Error::validation("request_timeout_secs must be greater than 0"));
        }
        if self.orchestrator.failure_threshold == 0 {
            return Err(Error::validation("failure_threshold must be greater than 0"));
        }
        if self.cache.enabled && self.cache.ttl_secs == 0 {
            return Err(Error::validation("Cache ttl_secs must be greater than 0 when caching is enabled"));
        }
        if self.cache.enabled && self.cache.sweep_interval_secs == 0 {
            return Err(Error::validation("Cache sweep_interval_secs must be greater than 0"));
        }

        for (name, provider) in &self.providers {
            if provider.default_model.trim().is_empty() {
                return Err(Error::validation(format!("Provider {} has empty default_model", name)));
            }
            if provider.rate_limit.requests == 0 || provider.rate_limit.window_secs == 0 {
                return Err(Error::validation(format!(
                    "Provider {} has an empty rate limit budget",
                    name
                )));
            }
            if provider.api_base.is_none() && provider.kind.default_api_base().is_none() {
                return Err(Error::validation(format!("Provider {} needs an api_base", name)));
            }
        }

        Ok(())
    }

    /// Enabled providers in the order they would be registered.
    pub fn enabled_providers(&self) -> Vec<(&str, &ProviderConfig)> {
        let mut providers: Vec<_> = self
            .providers
            .iter()
            .filter(|(_, config)| config.enabled)
            .map(|(name, config)| (name.as_str(), config))
            .collect();

        providers.sort_by(|a, b| a.1.priority.cmp(&b.1.priority).then_with(|| a.0.cmp(b.0)));
        providers
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.orchestrator.request_timeout_secs)
    }

    pub fn to_orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            request_timeout: self.request_timeout(),
            failure_threshold: self.orchestrator.failure_threshold,
            cooldown: Duration::from_secs(self.orchestrator.cooldown_secs),
            cache_enabled: self.cache.enabled,
            cache_ttl: Duration::from_secs(self.cache.ttl_secs),
            cache_sweep_interval: Duration::from_secs(self.cache.sweep_interval_secs),
            default_model: self
                .orchestrator
                .default_model
                .clone()
                .filter(|model| !model.trim().is_empty()),
        }
    }

    /// Adapter settings for one provider, resolving its credential through `lookup`.
    pub fn adapter_settings<F>(&self, name: &str, provider: &ProviderConfig, lookup: F) -> AdapterSettings
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = provider
            .api_key_env
            .as_deref()
            .and_then(|var| lookup(var))
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        AdapterSettings {
            name: name.to_string(),
            kind: provider.kind,
            api_base: provider.api_base.clone(),
            api_key,
            default_model: provider.default_model.clone(),
            models: provider.models.clone(),
            transport_timeout: self.request_timeout() + TRANSPORT_TIMEOUT_SLACK,
        }
    }
}
