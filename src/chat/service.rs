use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::chat::commands::{help_text, CommandParser, ModelAction, SlashCommand};
use crate::chat::memory::{MemoryStore, MemoryTier};
use crate::error::Error;
use crate::models::{
    CacheStats, GeneratedContent, GenerationOptions, Modality, Orchestrator, ProviderModels,
    ProviderStatsView,
};

const PERSONA_KEY: &str = "persona";

/// Front-end that turns input lines into orchestrator calls
pub struct ChatService {
    orchestrator: Arc<Orchestrator>,
    memory: MemoryStore,
    config: ChatServiceConfig,
}

#[derive(Debug, Clone)]
pub struct ChatServiceConfig {
    /// Memory key for the running conversation.
    pub session_key: String,
    /// Conversation turns folded into the system prompt.
    pub history_turns: usize,
    pub system_prompt: String,
    pub max_tokens: Option<u32>,
}

impl Default for ChatServiceConfig {
    fn default() -> Self {
        Self {
            session_key: "default".to_string(),
            history_turns: 6,
            system_prompt: "You are a helpful assistant. Answer concisely.".to_string(),
            max_tokens: Some(1024),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChatReply {
    /// Model output with the provider that produced it.
    Message {
        text: String,
        provider: String,
        cached: bool,
    },
    Image {
        mime_type: String,
        data: Vec<u8>,
        provider: String,
    },
    /// Command output or a user-facing error.
    Notice(String),
    Quit,
}

impl ChatService {
    pub fn new(orchestrator: Arc<Orchestrator>, config: ChatServiceConfig) -> Self {
        Self::with_memory(orchestrator, MemoryStore::default(), config)
    }

    pub fn with_memory(orchestrator: Arc<Orchestrator>, memory: MemoryStore, config: ChatServiceConfig) -> Self {
        memory.remember(MemoryTier::Personality, PERSONA_KEY, config.system_prompt.clone());
        info!("Chat service ready (session {})", config.session_key);
        Self {
            orchestrator,
            memory,
            config,
        }
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub async fn handle_line(&self, line: &str) -> ChatReply {
        let line = line.trim();
        if line.is_empty() {
            return ChatReply::Notice(String::new());
        }

        match CommandParser::parse(line) {
            Some(command) => self.handle_command(command).await,
            None => self.send_message(line).await,
        }
    }

    async fn handle_command(&self, command: SlashCommand) -> ChatReply {
        debug!("Handling command: {:?}", command);
        match command {
            SlashCommand::Help => ChatReply::Notice(help_text().to_string()),
            SlashCommand::Stats => ChatReply::Notice(render_stats(
                &self.orchestrator.get_provider_stats(),
                self.orchestrator.cache_stats(),
            )),
            SlashCommand::Models => {
                ChatReply::Notice(render_models(&self.orchestrator.list_available_models()))
            }
            SlashCommand::Model { action } => self.handle_model(action),
            SlashCommand::Image { prompt } => self.generate_image(&prompt).await,
            SlashCommand::Forget => {
                let tiers = self.memory.forget_everywhere(&self.config.session_key);
                debug!("Forgot session {} in {} tiers", self.config.session_key, tiers);
                ChatReply::Notice("Conversation memory cleared.".to_string())
            }
            SlashCommand::Quit => ChatReply::Quit,
            SlashCommand::Unknown(what) => {
                ChatReply::Notice(format!("Unknown command: {}. Type /help for a list.", what))
            }
        }
    }

    fn handle_model(&self, action: ModelAction) -> ChatReply {
        match action {
            ModelAction::Show => match self.orchestrator.active_model() {
                Some(model) => ChatReply::Notice(format!("Active model: {}", model)),
                None => ChatReply::Notice("Active model: provider defaults".to_string()),
            },
            ModelAction::Set(name) => match self.orchestrator.switch_active_model(&name) {
                Ok(()) => ChatReply::Notice(format!("Active model set to {}", name)),
                Err(e) => ChatReply::Notice(e.to_string()),
            },
        }
    }

    async fn send_message(&self, text: &str) -> ChatReply {
        let key = &self.config.session_key;
        let mut options = GenerationOptions::default().with_system_prompt(self.system_prompt());
        if let Some(max_tokens) = self.config.max_tokens {
            options = options.with_max_tokens(max_tokens);
        }

        match self.orchestrator.generate(text, options, Modality::Text).await {
            Ok(response) => {
                let reply = match &response.content {
                    GeneratedContent::Text(reply) => reply.clone(),
                    GeneratedContent::Binary { mime_type, .. } => format!("[{} content]", mime_type),
                };
                self.memory.remember(MemoryTier::Conversation, key, format!("User: {}", text));
                self.memory.remember(MemoryTier::Conversation, key, format!("Assistant: {}", reply));
                ChatReply::Message {
                    text: reply,
                    provider: response.provider,
                    cached: response.cached,
                }
            }
            Err(e) => failure_notice(&e),
        }
    }

    async fn generate_image(&self, prompt: &str) -> ChatReply {
        match self
            .orchestrator
            .generate(prompt, GenerationOptions::default(), Modality::Image)
            .await
        {
            Ok(response) => match response.content {
                GeneratedContent::Binary { mime_type, data } => {
                    self.memory.remember(
                        MemoryTier::Individual,
                        &self.config.session_key,
                        format!("Image: {}", prompt),
                    );
                    ChatReply::Image {
                        mime_type,
                        data,
                        provider: response.provider,
                    }
                }
                GeneratedContent::Text(text) => ChatReply::Message {
                    text,
                    provider: response.provider,
                    cached: response.cached,
                },
            },
            Err(e) => failure_notice(&e),
        }
    }

    /// Persona plus the most recent conversation turns.
    fn system_prompt(&self) -> String {
        let mut prompt = self
            .memory
            .recall(MemoryTier::Personality, PERSONA_KEY, 1)
            .pop()
            .map(|entry| entry.content)
            .unwrap_or_else(|| self.config.system_prompt.clone());

        let history = self.memory.recall(
            MemoryTier::Conversation,
            &self.config.session_key,
            self.config.history_turns * 2,
        );
        if !history.is_empty() {
            prompt.push_str("\n\nRecent conversation:\n");
            for entry in history {
                prompt.push_str(&entry.content);
                prompt.push('\n');
            }
        }
        prompt
    }
}

fn failure_notice(error: &Error) -> ChatReply {
    warn!("Chat request failed: {}", error);
    let message = match error {
        Error::NoProvidersAvailable(modality) => {
            format!("No {} providers are available right now.", modality)
        }
        _ => "Sorry, none of the providers could answer right now. Please try again shortly."
            .to_string(),
    };
    ChatReply::Notice(message)
}

/// One line per provider, then a cache summary.
pub fn render_stats(stats: &[ProviderStatsView], cache: CacheStats) -> String {
    let mut out = String::new();
    if stats.is_empty() {
        out.push_str("No providers registered.\n");
    }
    for view in stats {
        let _ = writeln!(
            out,
            "{:<14} {:<6} {:<11} success {:>5.1}%  failures {}  window {}/{}  requests {}  latency {}",
            view.name,
            view.modality.as_str(),
            if view.available { "available" } else { "cooling" },
            view.success_rate,
            view.consecutive_failures,
            view.requests_in_current_window,
            view.rate_limit.max_requests,
            view.total_requests,
            view.average_latency_ms
                .map(|ms| format!("{}ms", ms))
                .unwrap_or_else(|| "-".to_string()),
        );
    }
    let _ = writeln!(
        out,
        "cache: {} hits, {} misses, {} entries",
        cache.hits, cache.misses, cache.entries
    );
    out
}

pub fn render_models(models: &[ProviderModels]) -> String {
    if models.is_empty() {
        return "No providers registered.".to_string();
    }

    let mut out = String::new();
    for entry in models {
        let _ = writeln!(out, "{} (default: {})", entry.provider, entry.default_model);
        for model in &entry.models {
            let _ = writeln!(out, "  - {}", model);
        }
    }
    out
}
