//! Response-log cache.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::Result;
use crate::scene_loop::events::{SceneEvent, SceneStatus};
use crate::types::CacheBehavior;

/// Cache for per-conversation response logs. Implementations must guarantee
/// atomic per-key updates; the engine adds no additional locking.
#[async_trait]
pub trait ResponseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<SceneEvent>>>;

    /// Persist the log. `ttl` carries the smallest cache expiration among
    /// the executed scenes; implementations may ignore it.
    async fn set(
        &self,
        key: &str,
        responses: &[SceneEvent],
        behavior: CacheBehavior,
        ttl: Option<Duration>,
    ) -> Result<()>;
}

/// Decides whether a replayed log is too large and condenses it.
pub trait LogSummarizer: Send + Sync {
    fn should_condense(&self, log: &[SceneEvent]) -> bool;

    /// Produce the single condensed event substituted for the raw replay.
    fn condense(&self, log: &[SceneEvent]) -> SceneEvent;
}

/// Condenses once a replayed log exceeds a configured event count.
pub struct ThresholdSummarizer {
    max_events: usize,
}

impl ThresholdSummarizer {
    pub fn new(max_events: usize) -> Self {
        Self { max_events }
    }
}

impl LogSummarizer for ThresholdSummarizer {
    fn should_condense(&self, log: &[SceneEvent]) -> bool {
        log.len() > self.max_events
    }

    fn condense(&self, log: &[SceneEvent]) -> SceneEvent {
        let texts: Vec<&str> = log
            .iter()
            .filter(|event| event.status == SceneStatus::Running)
            .filter_map(|event| event.message.as_deref())
            .filter(|text| !text.is_empty())
            .collect();
        let total_cost = log.last().map(|event| event.total_cost).unwrap_or(0.0);
        let mut condensed = SceneEvent::status(SceneStatus::Running).with_message(format!(
            "Summary of {} prior events:\n{}",
            log.len(),
            texts.join("\n")
        ));
        condensed.total_cost = total_cost;
        condensed
    }
}

/// In-memory cache with optional per-entry TTL.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (Vec<SceneEvent>, Option<Instant>)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResponseCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<SceneEvent>>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((_, Some(deadline))) if *deadline <= Instant::now() => {
                entries.remove(key);
                Ok(None)
            }
            Some((log, _)) => Ok(Some(log.clone())),
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        responses: &[SceneEvent],
        _behavior: CacheBehavior,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let deadline = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (responses.to_vec(), deadline));
        Ok(())
    }
}
