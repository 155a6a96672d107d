pub mod commands;
pub mod memory;
pub mod service;

pub use commands::{CommandParser, ModelAction, SlashCommand};
pub use memory::{MemoryConfig, MemoryEntry, MemoryStore, MemoryTier, TierLimits};
pub use service::{render_models, render_stats, ChatReply, ChatService, ChatServiceConfig};
