pub mod config;
pub mod state;

pub use config::{AppConfig, CacheSection, OrchestratorSection, ProviderConfig, RateLimitConfig};
pub use state::AppState;
