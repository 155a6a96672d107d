//! Tiered, bounded key → list memory used by the chat front-end.
//!
//! Each tier keeps one list per key. Lists drop their oldest item once the
//! tier's item capacity is reached, and a tier drops its oldest key once its
//! key capacity is reached.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryTier {
    Conversation,
    Personality,
    Individual,
}

impl MemoryTier {
    pub const ALL: [MemoryTier; 3] = [
        MemoryTier::Conversation,
        MemoryTier::Personality,
        MemoryTier::Individual,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    pub max_items: usize,
    pub max_keys: usize,
}

#[derive(Debug, Clone)]
pub struct MemoryConfig {
    pub conversation: TierLimits,
    pub personality: TierLimits,
    pub individual: TierLimits,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            conversation: TierLimits {
                max_items: 20,
                max_keys: 100,
            },
            personality: TierLimits {
                max_items: 50,
                max_keys: 10,
            },
            individual: TierLimits {
                max_items: 100,
                max_keys: 1000,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemoryEntry {
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct TierStore {
    limits: TierLimits,
    lists: HashMap<String, VecDeque<MemoryEntry>>,
    /// Keys in creation order, oldest first.
    order: VecDeque<String>,
}

impl TierStore {
    fn new(limits: TierLimits) -> Self {
        Self {
            limits: TierLimits {
                max_items: limits.max_items.max(1),
                max_keys: limits.max_keys.max(1),
            },
            lists: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn push(&mut self, key: &str, entry: MemoryEntry) {
        if !self.lists.contains_key(key) {
            while self.order.len() >= self.limits.max_keys {
                if let Some(oldest) = self.order.pop_front() {
                    debug!("Evicting memory key {}", oldest);
                    self.lists.remove(&oldest);
                }
            }
            self.order.push_back(key.to_string());
        }

        let list = self.lists.entry(key.to_string()).or_default();
        while list.len() >= self.limits.max_items {
            list.pop_front();
        }
        list.push_back(entry);
    }

    fn remove(&mut self, key: &str) -> bool {
        let removed = self.lists.remove(key).is_some();
        if removed {
            self.order.retain(|k| k != key);
        }
        removed
    }
}

pub struct MemoryStore {
    conversation: RwLock<TierStore>,
    personality: RwLock<TierStore>,
    individual: RwLock<TierStore>,
}

impl MemoryStore {
    pub fn new(config: MemoryConfig) -> Self {
        Self {
            conversation: RwLock::new(TierStore::new(config.conversation)),
            personality: RwLock::new(TierStore::new(config.personality)),
            individual: RwLock::new(TierStore::new(config.individual)),
        }
    }

    fn tier(&self, tier: MemoryTier) -> &RwLock<TierStore> {
        match tier {
            MemoryTier::Conversation => &self.conversation,
            MemoryTier::Personality => &self.personality,
            MemoryTier::Individual => &self.individual,
        }
    }

    pub fn remember(&self, tier: MemoryTier, key: &str, content: impl Into<String>) {
        self.tier(tier).write().push(
            key,
            MemoryEntry {
                content: content.into(),
                created_at: Utc::now(),
            },
        );
    }

    /// Up to `limit` most recent entries, oldest first.
    pub fn recall(&self, tier: MemoryTier, key: &str, limit: usize) -> Vec<MemoryEntry> {
        let store = self.tier(tier).read();
        match store.lists.get(key) {
            Some(list) => {
                let skip = list.len().saturating_sub(limit);
                list.iter().skip(skip).cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn forget(&self, tier: MemoryTier, key: &str) -> bool {
        self.tier(tier).write().remove(key)
    }

    /// Remove `key` from every tier. Returns how many tiers held it.
    pub fn forget_everywhere(&self, key: &str) -> usize {
        MemoryTier::ALL
            .into_iter()
            .filter(|tier| self.forget(*tier, key))
            .count()
    }

    pub fn len(&self, tier: MemoryTier, key: &str) -> usize {
        self.tier(tier)
            .read()
            .lists
            .get(key)
            .map_or(0, VecDeque::len)
    }

    pub fn key_count(&self, tier: MemoryTier) -> usize {
        self.tier(tier).read().lists.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}
