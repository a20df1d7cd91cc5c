//! Conversation memory: per-key long-lived summaries folded across requests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::chat::ChatClient;
use crate::error::Result;

/// Long-lived memory for one conversation key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationMemory {
    pub content: String,
    pub updated_at: DateTime<Utc>,
}

impl ConversationMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            updated_at: Utc::now(),
        }
    }
}

/// Storage for conversation memory. Implementations must guarantee atomic
/// per-key updates.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn get(
        &self,
        key: &str,
        metadata: &HashMap<String, String>,
        cancel: &CancellationToken,
    ) -> Result<Option<ConversationMemory>>;

    async fn set(
        &self,
        key: &str,
        memory: &ConversationMemory,
        cancel: &CancellationToken,
    ) -> Result<()>;
}

/// Folds a finished request into the prior memory.
#[async_trait]
pub trait MemorySummarizer: Send + Sync {
    async fn summarize(
        &self,
        previous: Option<&ConversationMemory>,
        new_message: &str,
        transcript: &[String],
        metadata: &HashMap<String, String>,
        chat: Arc<dyn ChatClient>,
        cancel: &CancellationToken,
    ) -> Result<ConversationMemory>;
}

/// In-memory per-key memory map.
#[derive(Default)]
pub struct InMemoryMemoryStore {
    entries: Mutex<HashMap<String, ConversationMemory>>,
}

impl InMemoryMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryMemoryStore {
    async fn get(
        &self,
        key: &str,
        _metadata: &HashMap<String, String>,
        _cancel: &CancellationToken,
    ) -> Result<Option<ConversationMemory>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(
        &self,
        key: &str,
        memory: &ConversationMemory,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), memory.clone());
        Ok(())
    }
}

/// Appends the transcript to prior memory, bounded to a configured length.
/// Keeps the tail when the bound is exceeded: recent turns matter more.
pub struct FoldMemorySummarizer {
    max_len: usize,
}

impl FoldMemorySummarizer {
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

#[async_trait]
impl MemorySummarizer for FoldMemorySummarizer {
    async fn summarize(
        &self,
        previous: Option<&ConversationMemory>,
        _new_message: &str,
        transcript: &[String],
        _metadata: &HashMap<String, String>,
        _chat: Arc<dyn ChatClient>,
        _cancel: &CancellationToken,
    ) -> Result<ConversationMemory> {
        let mut content = previous.map(|m| m.content.clone()).unwrap_or_default();
        for line in transcript {
            if !content.is_empty() {
                content.push('\n');
            }
            content.push_str(line);
        }
        if content.len() > self.max_len {
            let cut = content.len() - self.max_len;
            let boundary = content
                .char_indices()
                .map(|(i, _)| i)
                .find(|&i| i >= cut)
                .unwrap_or(0);
            content = content[boundary..].to_string();
        }
        Ok(ConversationMemory::new(content))
    }
}
