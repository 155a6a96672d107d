//! Scripted in-memory adapter used by unit tests across the crate.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::ProviderError;
use crate::models::provider::{GeneratedContent, GenerationOptions, ProviderAdapter};

type Outcome = std::result::Result<GeneratedContent, ProviderError>;

pub struct ScriptedAdapter {
    name: String,
    models: Vec<String>,
    script: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    last_options: Mutex<Option<GenerationOptions>>,
}

impl ScriptedAdapter {
    pub fn new(name: &str, fallback: Outcome) -> Self {
        Self {
            name: name.to_string(),
            models: vec![format!("{}-default", name), format!("{}-large", name)],
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            last_options: Mutex::new(None),
        }
    }

    pub fn ok(name: &str, text: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Ok(GeneratedContent::Text(text.to_string()))))
    }

    pub fn failing(name: &str) -> Arc<Self> {
        Arc::new(Self::new(name, Err(ProviderError::network("connection refused"))))
    }

    /// Outcomes returned in order before falling back to the default.
    pub fn with_script(self, outcomes: Vec<Outcome>) -> Self {
        *self.script.lock() = outcomes.into();
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<GenerationOptions> {
        self.last_options.lock().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    async fn invoke(&self, _prompt: &str, options: &GenerationOptions) -> Outcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_options.lock() = Some(options.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.script.lock().pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }

    fn provider_name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.models[0]
    }

    fn models(&self) -> &[String] {
        &self.models
    }
}
