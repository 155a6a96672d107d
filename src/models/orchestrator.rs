use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Error, ProviderError, Result};
use crate::models::cache::{CacheKey, CacheStats, ResponseCache, DEFAULT_TTL};
use crate::models::circuit_breaker::{DEFAULT_COOLDOWN, DEFAULT_FAILURE_THRESHOLD};
use crate::models::provider::{
    GeneratedContent, GenerationOptions, GenerationResponse, Modality, ProviderAdapter,
};
use crate::models::rate_limiter::RateBudget;
use crate::models::registry::{ProviderEntry, ProviderRegistry, ProviderSpec};
use crate::models::stats::StatisticsAggregator;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub request_timeout: Duration,
    pub failure_threshold: u32,
    pub cooldown: Duration,
    pub cache_enabled: bool,
    pub cache_ttl: Duration,
    pub cache_sweep_interval: Duration,
    pub default_model: Option<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            cache_enabled: true,
            cache_ttl: DEFAULT_TTL,
            cache_sweep_interval: Duration::from_secs(300),
            default_model: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderStatsView {
    pub name: String,
    pub modality: Modality,
    pub available: bool,
    pub consecutive_failures: u32,
    pub success_rate: f64,
    pub requests_in_current_window: u32,
    pub rate_limit: RateBudget,
    pub last_used: Option<DateTime<Utc>>,
    pub total_requests: u64,
    pub average_latency_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderModels {
    pub provider: String,
    pub default_model: String,
    pub models: Vec<String>,
}

/// Routes generation requests across the registered providers.
///
/// Candidates are tried one at a time, best first, and the first success
/// wins. Providers are never raced in parallel: every extra call spends a
/// free-tier rate budget.
pub struct Orchestrator {
    registry: ProviderRegistry,
    cache: Arc<ResponseCache>,
    stats: StatisticsAggregator,
    config: OrchestratorConfig,
    active_model: ArcSwapOption<String>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        info!(
            "Creating orchestrator (timeout {:?}, threshold {}, cooldown {:?}, cache {})",
            config.request_timeout,
            config.failure_threshold,
            config.cooldown,
            if config.cache_enabled { "on" } else { "off" }
        );

        Self {
            registry: ProviderRegistry::new(config.failure_threshold, config.cooldown),
            cache: Arc::new(ResponseCache::new(config.cache_enabled, config.cache_ttl)),
            stats: StatisticsAggregator::new(),
            active_model: ArcSwapOption::new(config.default_model.clone().map(Arc::new)),
            config,
            sweeper: Mutex::new(None),
        }
    }

    pub fn register(&self, spec: ProviderSpec, adapter: Arc<dyn ProviderAdapter>) {
        self.registry.register(spec, adapter);
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start the periodic cache sweep. Calling it twice replaces the old task.
    pub fn start_background_tasks(&self) {
        if !self.cache.is_enabled() {
            return;
        }
        let handle = self.cache.spawn_sweeper(self.config.cache_sweep_interval);
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
        debug!(
            "Cache sweeper started with interval {:?}",
            self.config.cache_sweep_interval
        );
    }

    pub fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
            info!("Orchestrator background tasks stopped");
        }
    }

    pub async fn generate(
        &self,
        prompt: &str,
        options: GenerationOptions,
        modality: Modality,
    ) -> Result<GenerationResponse> {
        options.validate_sampling()?;
        let options = self.apply_active_model(options);

        let cache_key = if self.cache.is_enabled() {
            Some(CacheKey::new(modality, prompt, &options)?)
        } else {
            None
        };

        if let Some(key) = &cache_key {
            if let Some(mut cached) = self.cache.get(key) {
                debug!("Cache hit for {} request served by {}", modality, cached.provider);
                cached.cached = true;
                return Ok(cached);
            }
        }

        let candidates = self.candidates(modality);
        if candidates.is_empty() {
            warn!("No providers available for modality {}", modality);
            return Err(Error::NoProvidersAvailable(modality));
        }

        debug!(
            "Candidate order for {}: {:?}",
            modality,
            candidates.iter().map(|c| c.name()).collect::<Vec<_>>()
        );

        let mut last_error = None;

        for entry in &candidates {
            // Another request may have tripped the breaker since the list was built.
            if !entry.is_available() {
                debug!("Skipping provider {}: breaker open", entry.name());
                last_error = Some(Error::ProviderUnavailable(entry.name().to_string()));
                continue;
            }

            if !entry.window.try_reserve() {
                debug!("Skipping provider {}: rate window exhausted", entry.name());
                last_error = Some(Error::RateLimited(entry.name().to_string()));
                continue;
            }

            match self.attempt(entry, prompt, &options).await {
                Ok(response) => {
                    if let Some(key) = cache_key {
                        self.cache.put(key, response.clone());
                    }
                    return Ok(response);
                }
                Err(e) => last_error = Some(e),
            }
        }

        let last_error = last_error.unwrap_or(Error::NoProvidersAvailable(modality));
        error!(
            "All {} candidate providers failed for {} request: {}",
            candidates.len(),
            modality,
            last_error
        );
        Err(Error::AllProvidersFailed {
            last_error: Box::new(last_error),
        })
    }

    /// Available providers for `modality`, best first.
    ///
    /// Order: higher success rate, then fewer consecutive failures, then
    /// lower configured priority, then name.
    pub fn candidates(&self, modality: Modality) -> Vec<Arc<ProviderEntry>> {
        let mut ranked: Vec<_> = self
            .registry
            .providers_for(modality)
            .into_iter()
            .map(|entry| {
                let success_rate = self.stats.success_rate(entry.name());
                let failures = entry.consecutive_failures();
                (entry, success_rate, failures)
            })
            .collect();

        ranked.sort_by(|(a, a_rate, a_failures), (b, b_rate, b_failures)| {
            b_rate
                .total_cmp(a_rate)
                .then_with(|| a_failures.cmp(b_failures))
                .then_with(|| a.spec.priority.cmp(&b.spec.priority))
                .then_with(|| a.name().cmp(b.name()))
        });

        ranked.into_iter().map(|(entry, _, _)| entry).collect()
    }

    async fn attempt(
        &self,
        entry: &ProviderEntry,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<GenerationResponse> {
        let name = entry.name();
        let model = entry.adapter.resolve_model(options.model.as_deref());
        debug!(provider = name, model = %model, "Calling provider");

        let start_time = Instant::now();
        let outcome = match timeout(self.config.request_timeout, entry.adapter.invoke(prompt, options)).await {
            Ok(Ok(content)) if content.is_empty() => {
                Err(ProviderError::malformed("provider returned empty content"))
            }
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(self.config.request_timeout)),
        };
        let latency = start_time.elapsed();

        match outcome {
            Ok(content) => {
                self.stats.record_attempt(name, true, latency);
                entry.breaker.record_success();
                entry.touch();

                info!(
                    "Generated response using {}:{} in {}ms",
                    name,
                    model,
                    latency.as_millis()
                );

                Ok(GenerationResponse {
                    id: Uuid::new_v4().to_string(),
                    provider: name.to_string(),
                    model,
                    content,
                    latency_ms: latency.as_millis() as u64,
                    created_at: Utc::now(),
                    cached: false,
                })
            }
            Err(cause) => {
                self.stats.record_attempt(name, false, latency);
                let tripped = entry.breaker.record_failure();

                warn!(
                    "Provider {} failed after {}ms: {} (consecutive failures: {}{})",
                    name,
                    latency.as_millis(),
                    cause,
                    entry.consecutive_failures(),
                    if tripped { ", now disabled" } else { "" }
                );

                Err(Error::call_failed(name, cause))
            }
        }
    }

    fn apply_active_model(&self, mut options: GenerationOptions) -> GenerationOptions {
        if options.model.is_none() {
            options.model = self.active_model();
        }
        options
    }

    /// Record a preferred default model label. Provider ordering is unaffected.
    pub fn switch_active_model(&self, name: &str) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Model name cannot be empty"));
        }
        self.active_model.store(Some(Arc::new(name.to_string())));
        info!("Active model set to {}", name);
        Ok(())
    }

    pub fn active_model(&self) -> Option<String> {
        self.active_model.load_full().map(|name| name.as_ref().clone())
    }

    /// Per-provider operational view, busiest first.
    pub fn get_provider_stats(&self) -> Vec<ProviderStatsView> {
        let mut views: Vec<_> = self
            .registry
            .all()
            .into_iter()
            .map(|entry| {
                let name = entry.name();
                ProviderStatsView {
                    name: name.to_string(),
                    modality: entry.spec.modality,
                    available: entry.is_available(),
                    consecutive_failures: entry.consecutive_failures(),
                    success_rate: self.stats.success_rate(name),
                    requests_in_current_window: entry.window.requests_in_window(),
                    rate_limit: entry.window.budget(),
                    last_used: entry.last_used(),
                    total_requests: self.stats.total_attempts(name),
                    average_latency_ms: self
                        .stats
                        .average_latency(name)
                        .map(|d| d.as_millis() as u64),
                }
            })
            .collect();

        views.sort_by(|a, b| {
            b.total_requests
                .cmp(&a.total_requests)
                .then_with(|| a.name.cmp(&b.name))
        });
        views
    }

    /// Models each provider is configured with. Providers are not queried.
    pub fn list_available_models(&self) -> Vec<ProviderModels> {
        let mut entries = self.registry.all();
        entries.sort_by(|a, b| match a.spec.priority.cmp(&b.spec.priority) {
            Ordering::Equal => a.name().cmp(b.name()),
            other => other,
        });

        entries
            .into_iter()
            .map(|entry| ProviderModels {
                provider: entry.name().to_string(),
                default_model: entry.adapter.default_model().to_string(),
                models: entry.adapter.models().to_vec(),
            })
            .collect()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::testing::ScriptedAdapter;
    use tokio::time::advance;

    fn spec(name: &str, modality: Modality, priority: i32) -> ProviderSpec {
        ProviderSpec::new(name, modality, priority, RateBudget::per_minute(100))
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(OrchestratorConfig::default())
    }

    fn uncached() -> Orchestrator {
        Orchestrator::new(OrchestratorConfig {
            cache_enabled: false,
            ..OrchestratorConfig::default()
        })
    }

    fn names(candidates: &[Arc<ProviderEntry>]) -> Vec<&str> {
        candidates.iter().map(|c| c.name()).collect()
    }

    #[tokio::test]
    async fn test_cache_hit_skips_providers() {
        let orch = orchestrator();
        let adapter = ScriptedAdapter::ok("groq", "hello there");
        orch.register(spec("groq", Modality::Text, 1), adapter.clone());

        let first = orch
            .generate("hi", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();
        assert!(!first.cached);

        let second = orch
            .generate("hi", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.content, first.content);
        assert_eq!(adapter.calls(), 1);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_calls_provider() {
        let orch = uncached();
        let adapter = ScriptedAdapter::ok("groq", "hello");
        orch.register(spec("groq", Modality::Text, 1), adapter.clone());

        for _ in 0..2 {
            let response = orch
                .generate("hi", GenerationOptions::default(), Modality::Text)
                .await
                .unwrap();
            assert!(!response.cached);
        }
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_ttl_expiry_reinvokes_provider() {
        let orch = Orchestrator::new(OrchestratorConfig {
            cache_ttl: Duration::from_millis(1000),
            ..OrchestratorConfig::default()
        });
        let adapter = ScriptedAdapter::ok("groq", "R");
        orch.register(spec("groq", Modality::Text, 1), adapter.clone());

        orch.generate("q", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();
        advance(Duration::from_millis(1500)).await;
        let response = orch
            .generate("q", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();

        assert!(!response.cached);
        assert_eq!(adapter.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_five_failures_disable_until_cooldown() {
        let orch = uncached();
        let failing = ScriptedAdapter::failing("d");
        orch.register(spec("d", Modality::Text, 1), failing.clone());

        for attempt in 1..=5 {
            let err = orch
                .generate("x", GenerationOptions::default(), Modality::Text)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::AllProvidersFailed { .. }), "attempt {}", attempt);
        }

        let entry = orch.registry().get("d").unwrap();
        assert!(!entry.is_available());

        let err = orch
            .generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoProvidersAvailable(Modality::Text)));
        assert_eq!(failing.calls(), 5);

        advance(Duration::from_secs(299)).await;
        assert!(orch.candidates(Modality::Text).is_empty());

        advance(Duration::from_secs(1)).await;
        assert_eq!(names(&orch.candidates(Modality::Text)), vec!["d"]);
        assert_eq!(entry.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_tripped_provider_skipped_for_next_request() {
        let orch = uncached();
        let d = ScriptedAdapter::failing("d");
        let e = ScriptedAdapter::ok("e", "from e");
        orch.register(spec("d", Modality::Text, 1), d.clone());
        orch.register(spec("e", Modality::Text, 2), e.clone());

        // Fail d directly so its success rate alone doesn't push it behind e.
        let entry = orch.registry().get("d").unwrap();
        for _ in 0..5 {
            entry.breaker.record_failure();
        }

        let response = orch
            .generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();
        assert_eq!(response.provider, "e");
        assert_eq!(d.calls(), 0);
        assert_eq!(names(&orch.candidates(Modality::Text)), vec!["e"]);
    }

    #[tokio::test]
    async fn test_single_success_resets_failures() {
        let orch = uncached();
        let adapter = ScriptedAdapter::new("a", Ok(GeneratedContent::Text("ok".into())))
            .with_script(vec![
                Err(ProviderError::network("1")),
                Err(ProviderError::network("2")),
                Err(ProviderError::network("3")),
                Err(ProviderError::network("4")),
            ])
            .shared();
        orch.register(spec("a", Modality::Text, 1), adapter.clone());

        for _ in 0..4 {
            assert!(orch
                .generate("x", GenerationOptions::default(), Modality::Text)
                .await
                .is_err());
        }
        let entry = orch.registry().get("a").unwrap();
        assert_eq!(entry.consecutive_failures(), 4);

        orch.generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();
        assert_eq!(entry.consecutive_failures(), 0);
        assert!(entry.is_available());
    }

    #[tokio::test]
    async fn test_ordering_prefers_reliability_over_priority() {
        let orch = orchestrator();
        orch.register(spec("a", Modality::Text, 1), ScriptedAdapter::ok("a", "a"));
        orch.register(spec("b", Modality::Text, 2), ScriptedAdapter::ok("b", "b"));

        // A: 40% success, 2 consecutive failures.
        for success in [true, true, false, false, false] {
            orch.stats.record_attempt("a", success, Duration::from_millis(10));
        }
        let a = orch.registry().get("a").unwrap();
        a.breaker.record_failure();
        a.breaker.record_failure();

        // B: 90% success, no current failures.
        for i in 0..10 {
            orch.stats.record_attempt("b", i != 0, Duration::from_millis(10));
        }

        assert_eq!(names(&orch.candidates(Modality::Text)), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_ordering_ties_broken_by_priority() {
        let orch = orchestrator();
        orch.register(spec("late", Modality::Text, 3), ScriptedAdapter::ok("late", "x"));
        orch.register(spec("early", Modality::Text, 1), ScriptedAdapter::ok("early", "x"));
        orch.register(spec("middle", Modality::Multimodal, 2), ScriptedAdapter::ok("middle", "x"));

        for _ in 0..3 {
            assert_eq!(
                names(&orch.candidates(Modality::Text)),
                vec!["early", "middle", "late"]
            );
        }
    }

    #[tokio::test]
    async fn test_ordering_fewer_failures_before_priority() {
        let orch = orchestrator();
        orch.register(spec("a", Modality::Text, 1), ScriptedAdapter::ok("a", "x"));
        orch.register(spec("b", Modality::Text, 2), ScriptedAdapter::ok("b", "x"));

        orch.registry().get("a").unwrap().breaker.record_failure();
        assert_eq!(names(&orch.candidates(Modality::Text)), vec!["b", "a"]);
    }

    #[tokio::test]
    async fn test_rate_limited_only_candidate_fails_without_call() {
        let orch = uncached();
        let c = ScriptedAdapter::ok("c", "picture");
        orch.register(
            ProviderSpec::new("c", Modality::Image, 1, RateBudget::new(1, Duration::from_secs(60))),
            c.clone(),
        );

        orch.generate("cat", GenerationOptions::default(), Modality::Image)
            .await
            .unwrap();
        assert_eq!(c.calls(), 1);

        let err = orch
            .generate("dog", GenerationOptions::default(), Modality::Image)
            .await
            .unwrap_err();
        match err {
            Error::AllProvidersFailed { last_error } => {
                assert!(matches!(*last_error, Error::RateLimited(ref name) if name == "c"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(c.calls(), 1);
        // Rate limiting is not a provider failure.
        assert_eq!(orch.registry().get("c").unwrap().consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let orch = uncached();
        let first = ScriptedAdapter::ok("first", "one");
        let second = ScriptedAdapter::ok("second", "two");
        orch.register(spec("first", Modality::Text, 1), first.clone());
        orch.register(spec("second", Modality::Text, 2), second.clone());

        let response = orch
            .generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();
        assert_eq!(response.content.as_text(), Some("one"));
        assert_eq!(second.calls(), 0);
    }

    #[tokio::test]
    async fn test_falls_back_on_failure_and_keeps_last_error() {
        let orch = uncached();
        let broken = ScriptedAdapter::new("broken", Err(ProviderError::from_status(402, "no credit"))).shared();
        let healthy = ScriptedAdapter::ok("healthy", "fine");
        orch.register(spec("broken", Modality::Text, 1), broken.clone());
        orch.register(spec("healthy", Modality::Text, 2), healthy.clone());

        let response = orch
            .generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();
        assert_eq!(response.provider, "healthy");
        assert_eq!(broken.calls(), 1);

        let stats = orch.get_provider_stats();
        let broken_view = stats.iter().find(|s| s.name == "broken").unwrap();
        assert_eq!(broken_view.success_rate, 0.0);
        assert_eq!(broken_view.consecutive_failures, 1);
    }

    #[tokio::test]
    async fn test_all_failed_carries_last_cause() {
        let orch = uncached();
        orch.register(spec("a", Modality::Text, 1), ScriptedAdapter::failing("a"));
        orch.register(
            spec("b", Modality::Text, 2),
            ScriptedAdapter::new("b", Err(ProviderError::malformed("bad json"))).shared(),
        );

        let err = orch
            .generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap_err();
        assert_eq!(err.provider_cause(), Some(&ProviderError::malformed("bad json")));
    }

    #[tokio::test]
    async fn test_no_providers_for_modality() {
        let orch = orchestrator();
        orch.register(spec("text", Modality::Text, 1), ScriptedAdapter::ok("text", "x"));

        let err = orch
            .generate("x", GenerationOptions::default(), Modality::Audio)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoProvidersAvailable(Modality::Audio)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let orch = Orchestrator::new(OrchestratorConfig {
            request_timeout: Duration::from_secs(30),
            cache_enabled: false,
            ..OrchestratorConfig::default()
        });
        let slow = ScriptedAdapter::new("slow", Ok(GeneratedContent::Text("late".into())))
            .with_delay(Duration::from_secs(60))
            .shared();
        orch.register(spec("slow", Modality::Text, 1), slow.clone());

        let err = orch
            .generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap_err();
        assert_eq!(
            err.provider_cause(),
            Some(&ProviderError::Timeout(Duration::from_secs(30)))
        );
        assert_eq!(orch.registry().get("slow").unwrap().consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_success_does_not_reopen_tripped_provider() {
        let orch = Arc::new(uncached());
        let slow = ScriptedAdapter::new("slow", Ok(GeneratedContent::Text("late".into())))
            .with_delay(Duration::from_secs(10))
            .shared();
        orch.register(spec("slow", Modality::Text, 1), slow.clone());
        let entry = orch.registry().get("slow").unwrap();

        let in_flight = {
            let orch = orch.clone();
            tokio::spawn(async move {
                orch.generate("x", GenerationOptions::default(), Modality::Text)
                    .await
            })
        };
        tokio::task::yield_now().await;
        assert_eq!(slow.calls(), 1);

        // Other requests trip the breaker while the slow call is pending.
        for _ in 0..5 {
            entry.breaker.record_failure();
        }
        assert!(!entry.is_available());

        advance(Duration::from_secs(10)).await;
        let response = in_flight.await.unwrap().unwrap();
        assert_eq!(response.provider, "slow");

        assert_eq!(entry.consecutive_failures(), 0);
        assert!(!entry.is_available());
        assert!(orch.candidates(Modality::Text).is_empty());

        advance(Duration::from_secs(289)).await;
        assert!(!entry.is_available());

        advance(Duration::from_secs(1)).await;
        assert!(entry.is_available());
        assert_eq!(names(&orch.candidates(Modality::Text)), vec!["slow"]);
    }

    #[tokio::test]
    async fn test_non_finite_temperature_rejected_before_cache() {
        let orch = orchestrator();
        let adapter = ScriptedAdapter::ok("groq", "hello");
        orch.register(spec("groq", Modality::Text, 1), adapter.clone());

        orch.generate("hi", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();

        let err = orch
            .generate("hi", GenerationOptions::default().with_temperature(f32::NAN), Modality::Text)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(adapter.calls(), 1);
        assert_eq!(orch.cache_stats().hits, 0);
    }

    #[tokio::test]
    async fn test_empty_content_is_a_failure() {
        let orch = uncached();
        orch.register(spec("blank", Modality::Text, 1), ScriptedAdapter::ok("blank", "   "));

        let err = orch
            .generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap_err();
        assert!(matches!(
            err.provider_cause(),
            Some(ProviderError::MalformedResponse(_))
        ));
    }

    #[tokio::test]
    async fn test_active_model_fills_missing_option() {
        let orch = uncached();
        let adapter = ScriptedAdapter::ok("groq", "x");
        orch.register(spec("groq", Modality::Text, 1), adapter.clone());

        assert!(orch.switch_active_model("  ").is_err());
        orch.switch_active_model("groq-large").unwrap();
        assert_eq!(orch.active_model().as_deref(), Some("groq-large"));

        let response = orch
            .generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();
        assert_eq!(response.model, "groq-large");
        assert_eq!(
            adapter.last_options().unwrap().model.as_deref(),
            Some("groq-large")
        );

        // An explicit model wins over the label; unknown models fall back to the default.
        let response = orch
            .generate("x", GenerationOptions::default().with_model("other"), Modality::Text)
            .await
            .unwrap();
        assert_eq!(response.model, "groq-default");
    }

    #[tokio::test]
    async fn test_provider_stats_view() {
        let orch = uncached();
        orch.register(spec("used", Modality::Text, 2), ScriptedAdapter::ok("used", "x"));
        orch.register(spec("idle", Modality::Image, 1), ScriptedAdapter::ok("idle", "x"));

        orch.generate("x", GenerationOptions::default(), Modality::Text)
            .await
            .unwrap();

        let stats = orch.get_provider_stats();
        assert_eq!(stats[0].name, "used");
        assert_eq!(stats[0].total_requests, 1);
        assert_eq!(stats[0].requests_in_current_window, 1);
        assert_eq!(stats[0].success_rate, 100.0);
        assert!(stats[0].last_used.is_some());
        assert_eq!(stats[1].name, "idle");
        assert_eq!(stats[1].total_requests, 0);
        assert!(stats[1].last_used.is_none());
        assert!(stats[1].available);
    }

    #[tokio::test]
    async fn test_list_available_models_by_priority() {
        let orch = orchestrator();
        orch.register(spec("second", Modality::Text, 2), ScriptedAdapter::ok("second", "x"));
        orch.register(spec("first", Modality::Image, 1), ScriptedAdapter::ok("first", "x"));

        let models = orch.list_available_models();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].provider, "first");
        assert_eq!(models[0].default_model, "first-default");
        assert_eq!(models[1].models, vec!["second-default", "second-large"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_requests_share_budget() {
        let orch = Arc::new(uncached());
        let adapter = ScriptedAdapter::ok("groq", "x");
        orch.register(
            ProviderSpec::new("groq", Modality::Text, 1, RateBudget::new(10, Duration::from_secs(3600))),
            adapter.clone(),
        );

        let mut handles = Vec::new();
        for i in 0..25 {
            let orch = orch.clone();
            handles.push(tokio::spawn(async move {
                orch.generate(&format!("prompt {}", i), GenerationOptions::default(), Modality::Text)
                    .await
                    .is_ok()
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap() {
                successes += 1;
            }
        }

        assert_eq!(successes, 10);
        assert_eq!(adapter.calls(), 10);
    }

    #[tokio::test]
    async fn test_background_tasks_start_and_stop() {
        let orch = orchestrator();
        orch.start_background_tasks();
        assert!(orch.sweeper.lock().is_some());
        orch.shutdown();
        assert!(orch.sweeper.lock().is_none());
    }
}
