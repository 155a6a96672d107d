use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::app::config::AppConfig;
use crate::error::{Error, Result};
use crate::models::adapters::build_adapter;
use crate::models::Orchestrator;

/// Process-wide state: the loaded configuration and the single orchestrator
/// built from it.
pub struct AppState {
    config: AppConfig,
    config_path: PathBuf,
    orchestrator: Arc<Orchestrator>,
    statuses: BTreeMap<String, ProviderStatus>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderStatus {
    Ready,
    Disabled,
    MissingCredentials,
    Error(String),
}

impl AppState {
    /// Build state with credentials read from the process environment.
    pub fn new(config: AppConfig, config_path: PathBuf) -> Result<Self> {
        Self::with_key_lookup(config, config_path, |var| std::env::var(var).ok())
    }

    pub fn with_key_lookup<F>(config: AppConfig, config_path: PathBuf, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        info!("Initializing application state");
        config.validate()?;

        let orchestrator = Arc::new(Orchestrator::new(config.to_orchestrator_config()));
        let mut statuses = BTreeMap::new();

        for (name, provider) in &config.providers {
            if !provider.enabled {
                debug!("Provider {} is disabled", name);
                statuses.insert(name.clone(), ProviderStatus::Disabled);
                continue;
            }

            let settings = config.adapter_settings(name, provider, &lookup);
            let status = match build_adapter(&settings) {
                Ok(adapter) => {
                    orchestrator.register(provider.to_spec(name), adapter);
                    ProviderStatus::Ready
                }
                Err(Error::ProviderUnavailable(_)) => {
                    warn!(
                        "Skipping provider {}: credential {} is not set",
                        name,
                        provider.api_key_env.as_deref().unwrap_or("<none>")
                    );
                    ProviderStatus::MissingCredentials
                }
                Err(e) => {
                    warn!("Skipping provider {}: {}", name, e);
                    ProviderStatus::Error(e.to_string())
                }
            };
            statuses.insert(name.clone(), status);
        }

        info!(
            "Registered {} of {} configured providers",
            orchestrator.registry().len(),
            config.providers.len()
        );

        orchestrator.start_background_tasks();

        Ok(Self {
            config,
            config_path,
            orchestrator,
            statuses,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::clone(&self.orchestrator)
    }

    pub fn provider_status(&self, provider: &str) -> Option<&ProviderStatus> {
        self.statuses.get(provider)
    }

    pub fn provider_statuses(&self) -> &BTreeMap<String, ProviderStatus> {
        &self.statuses
    }

    pub fn shutdown(&self) {
        self.orchestrator.shutdown();
    }
}

impl Drop for AppState {
    fn drop(&mut self) {
        self.orchestrator.shutdown();
    }
}
