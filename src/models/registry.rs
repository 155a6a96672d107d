//! Catalogue of registered providers and their live availability state.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::models::circuit_breaker::CircuitBreaker;
use crate::models::provider::{Modality, ProviderAdapter};
use crate::models::rate_limiter::{FixedWindow, RateBudget};

/// Static description of one provider, fixed at registration.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSpec {
    /// Unique key in the registry (e.g. `"groq"`).
    pub name: String,
    pub modality: Modality,
    /// Tie-breaker, lower is preferred.
    pub priority: i32,
    pub rate_budget: RateBudget,
}

impl ProviderSpec {
    pub fn new(name: impl Into<String>, modality: Modality, priority: i32, rate_budget: RateBudget) -> Self {
        Self {
            name: name.into(),
            modality,
            priority,
            rate_budget,
        }
    }
}

/// A registered provider: spec, adapter, breaker and rate window.
pub struct ProviderEntry {
    pub spec: ProviderSpec,
    pub adapter: Arc<dyn ProviderAdapter>,
    pub breaker: CircuitBreaker,
    pub window: FixedWindow,
    last_used: RwLock<Option<DateTime<Utc>>>,
}

impl fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("spec", &self.spec)
            .field("breaker", &self.breaker.get_state())
            .field("failures", &self.breaker.get_failure_count())
            .finish()
    }
}

impl ProviderEntry {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn is_available(&self) -> bool {
        self.breaker.is_available()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.breaker.get_failure_count()
    }

    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        *self.last_used.read()
    }

    pub fn touch(&self) {
        *self.last_used.write() = Some(Utc::now());
    }
}

pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<ProviderEntry>>>,
    failure_threshold: u32,
    cooldown: Duration,
}

impl ProviderRegistry {
    pub fn new(failure_threshold: u32, cooldown: Duration) -> Self {
        Self {
            providers: RwLock::new(HashMap::new()),
            failure_threshold,
            cooldown,
        }
    }

    /// Add a provider under its name, replacing any previous registration.
    pub fn register(&self, spec: ProviderSpec, adapter: Arc<dyn ProviderAdapter>) -> Arc<ProviderEntry> {
        let entry = Arc::new(ProviderEntry {
            breaker: CircuitBreaker::new(spec.name.clone(), self.failure_threshold, self.cooldown),
            window: FixedWindow::new(spec.name.clone(), spec.rate_budget),
            spec,
            adapter,
            last_used: RwLock::new(None),
        });

        let previous = self
            .providers
            .write()
            .insert(entry.spec.name.clone(), entry.clone());

        if previous.is_some() {
            info!("Replaced provider registration: {}", entry.spec.name);
        } else {
            info!(
                "Registered provider {} ({}, priority {})",
                entry.spec.name, entry.spec.modality, entry.spec.priority
            );
        }
        entry
    }

    /// Available providers whose modality serves `modality`, in no particular order.
    pub fn providers_for(&self, modality: Modality) -> Vec<Arc<ProviderEntry>> {
        let matching: Vec<_> = self
            .providers
            .read()
            .values()
            .filter(|entry| entry.spec.modality.serves(modality))
            .cloned()
            .collect();

        // Breaker checks may take a write lock, so run them outside the registry lock.
        matching.into_iter().filter(|entry| entry.is_available()).collect()
    }

    pub fn get(&self, name: &str) -> Option<Arc<ProviderEntry>> {
        self.providers.read().get(name).cloned()
    }

    pub fn all(&self) -> Vec<Arc<ProviderEntry>> {
        self.providers.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.providers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::ScriptedAdapter;

    fn spec(name: &str, modality: Modality, priority: i32) -> ProviderSpec {
        ProviderSpec::new(name, modality, priority, RateBudget::per_minute(10))
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(5, Duration::from_secs(300))
    }

    #[tokio::test]
    async fn test_providers_for_includes_multimodal() {
        let registry = registry();
        registry.register(spec("text", Modality::Text, 1), ScriptedAdapter::ok("text", "a"));
        registry.register(spec("image", Modality::Image, 1), ScriptedAdapter::ok("image", "b"));
        registry.register(spec("multi", Modality::Multimodal, 2), ScriptedAdapter::ok("multi", "c"));

        let mut names: Vec<_> = registry
            .providers_for(Modality::Image)
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["image", "multi"]);

        assert!(registry.providers_for(Modality::Audio).iter().all(|p| p.name() == "multi"));
    }

    #[tokio::test]
    async fn test_reregistration_replaces() {
        let registry = registry();
        registry.register(spec("groq", Modality::Text, 1), ScriptedAdapter::ok("groq", "a"));
        registry.register(spec("groq", Modality::Image, 7), ScriptedAdapter::ok("groq", "b"));

        assert_eq!(registry.len(), 1);
        let entry = registry.get("groq").unwrap();
        assert_eq!(entry.spec.priority, 7);
        assert_eq!(entry.spec.modality, Modality::Image);
    }

    #[tokio::test]
    async fn test_unavailable_providers_filtered() {
        let registry = registry();
        let entry = registry.register(spec("groq", Modality::Text, 1), ScriptedAdapter::ok("groq", "a"));
        registry.register(spec("cerebras", Modality::Text, 2), ScriptedAdapter::ok("cerebras", "b"));

        entry.breaker.force_open();

        let available = registry.providers_for(Modality::Text);
        assert_eq!(available.len(), 1);
        assert_eq!(available[0].name(), "cerebras");
        assert_eq!(registry.all().len(), 2);
    }
}
