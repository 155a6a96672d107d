pub mod adapters;
pub mod cache;
pub mod circuit_breaker;
pub mod orchestrator;
pub mod provider;
pub mod rate_limiter;
pub mod registry;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{CacheKey, CacheStats, ResponseCache};
pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use orchestrator::{Orchestrator, OrchestratorConfig, ProviderModels, ProviderStatsView};
pub use provider::{
    GeneratedContent, GenerationOptions, GenerationResponse, Modality, ProviderAdapter,
    ProviderExtension,
};
pub use rate_limiter::{FixedWindow, RateBudget};
pub use registry::{ProviderEntry, ProviderRegistry, ProviderSpec};
pub use stats::{ProviderStatistics, StatisticsAggregator};
