//! Request-scoped mutable state.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::chat::ChatClient;
use crate::scene::ActorInput;
use crate::scene_loop::events::{SceneEvent, SceneStatus};
use crate::services::memory::ConversationMemory;
use crate::types::{CacheBehavior, ToolCall, Usage};

/// Where the request currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionPhase {
    #[default]
    Initializing,
    MainActors,
    Running,
    AwaitingClient,
    Finalizing,
    Completed,
    Failed,
}

/// Persisted subset of context for a paused client-side tool call.
///
/// Round-trips through the cache inside the persisted `AwaitingClient`
/// event; resumable only via the exact conversation key that produced the
/// pause.
#[derive(Debug, Clone, PartialEq)]
pub struct ContinuationState {
    pub scene: String,
    /// Equals the client tool's name, so the caller-facing correlation key
    /// is stable across processes.
    pub interaction_id: String,
    pub call_id: String,
    pub call_name: String,
    pub arguments: serde_json::Value,
}

/// Request-scoped state. Created once per request by the manager, mutated by
/// every downstream component, never itself persisted (only the event log
/// and memory views are).
pub struct SceneContext {
    pub input: String,
    pub metadata: HashMap<String, String>,
    pub conversation_key: String,
    pub cache_behavior: CacheBehavior,
    pub chat: Arc<dyn ChatClient>,
    /// Replayed prior-request events loaded from the cache.
    pub history: Vec<SceneEvent>,
    /// Events recorded for this request; `history + responses` is the
    /// persisted log.
    pub responses: Vec<SceneEvent>,
    /// Server tool calls executed, per scene.
    pub executed_scenes: HashMap<String, Vec<ToolCall>>,
    /// Scene execution sequence, no duplicates.
    pub executed_scene_order: Vec<String>,
    /// Per-scene summary text used by the final-response generator.
    pub scene_results: HashMap<String, String>,
    /// Pending client-side tool call, if the request paused.
    pub continuation: Option<ContinuationState>,
    /// Streamed text accumulated so far, keyed by scene name.
    pub streamed: HashMap<String, String>,
    /// Cumulative monetary cost; non-decreasing within a request.
    pub total_cost: f64,
    pub phase: ExecutionPhase,
    /// Messages contributed by the manager's main actors.
    pub main_actor_context: Vec<String>,
    /// Conversation memory loaded for this key, if any.
    pub memory: Option<ConversationMemory>,
    currency: String,
    seq: u64,
    tx: mpsc::UnboundedSender<SceneEvent>,
}

impl SceneContext {
    pub(crate) fn new(
        input: String,
        metadata: HashMap<String, String>,
        conversation_key: String,
        cache_behavior: CacheBehavior,
        chat: Arc<dyn ChatClient>,
        tx: mpsc::UnboundedSender<SceneEvent>,
    ) -> Self {
        let currency = chat.currency().to_string();
        Self {
            input,
            metadata,
            conversation_key,
            cache_behavior,
            chat,
            history: Vec::new(),
            responses: Vec::new(),
            executed_scenes: HashMap::new(),
            executed_scene_order: Vec::new(),
            scene_results: HashMap::new(),
            continuation: None,
            streamed: HashMap::new(),
            total_cost: 0.0,
            phase: ExecutionPhase::Initializing,
            main_actor_context: Vec::new(),
            memory: None,
            currency,
            seq: 0,
            tx,
        }
    }

    /// Emit an event: stamp seq, timestamp, cumulative cost and conversation
    /// key, record it (Streaming chunks are delivered but never recorded),
    /// and forward it to the caller.
    pub(crate) fn emit(&mut self, mut event: SceneEvent) {
        self.seq += 1;
        event.seq = self.seq;
        event.timestamp = Utc::now();
        event.total_cost = self.total_cost;
        event.currency = self.currency.clone();
        event.conversation_key = Some(self.conversation_key.clone());
        if event.status != SceneStatus::Streaming {
            self.responses.push(event.clone());
        }
        let _ = self.tx.send(event);
    }

    /// Re-emit a cached event: restamp seq and timestamp but keep the
    /// recorded cost figures.
    pub(crate) fn replay(&mut self, mut event: SceneEvent) {
        self.seq += 1;
        event.seq = self.seq;
        event.timestamp = Utc::now();
        event.conversation_key = Some(self.conversation_key.clone());
        if event.total_cost > self.total_cost {
            self.total_cost = event.total_cost;
        }
        self.responses.push(event.clone());
        let _ = self.tx.send(event);
    }

    /// Account one costed model call.
    pub(crate) fn account_model_call(&mut self, usage: &Usage, cost: f64) {
        tracing::debug!(
            conversation = %self.conversation_key,
            cost,
            input_tokens = usage.input_tokens,
            output_tokens = usage.output_tokens,
            "model call accounted"
        );
        self.total_cost += cost;
    }

    /// Whether the configured budget has been breached.
    pub(crate) fn over_budget(&self, max_budget: Option<f64>) -> bool {
        matches!(max_budget, Some(budget) if self.total_cost > budget)
    }

    /// Emit the request-terminal `BudgetExceeded` event.
    pub(crate) fn emit_budget_exceeded(&mut self, budget: f64) {
        tracing::warn!(
            conversation = %self.conversation_key,
            budget,
            total_cost = self.total_cost,
            "budget exceeded, stopping request"
        );
        self.phase = ExecutionPhase::Failed;
        let message = format!(
            "cost {:.4} exceeded the configured budget {:.4}",
            self.total_cost, budget
        );
        self.emit(SceneEvent::status(SceneStatus::BudgetExceeded).with_message(message));
    }

    /// Record that a scene started executing; the order never holds
    /// duplicates.
    pub(crate) fn record_scene_start(&mut self, scene: &str) {
        if !self.executed_scene_order.iter().any(|s| s == scene) {
            self.executed_scene_order.push(scene.to_string());
        }
        self.executed_scenes.entry(scene.to_string()).or_default();
    }

    /// Record a completed server tool call for a scene.
    pub(crate) fn record_tool_call(&mut self, scene: &str, call: &ToolCall) {
        self.executed_scenes
            .entry(scene.to_string())
            .or_default()
            .push(call.clone());
    }

    /// Append a streamed text chunk to the per-scene accumulator.
    pub(crate) fn append_streamed(&mut self, scene: &str, chunk: &str) {
        self.streamed
            .entry(scene.to_string())
            .or_default()
            .push_str(chunk);
    }

    /// Snapshot of this request for actor contributions.
    pub(crate) fn actor_input(&self) -> ActorInput {
        ActorInput {
            input: self.input.clone(),
            metadata: self.metadata.clone(),
            conversation_key: self.conversation_key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{ChatReply, ChatRequest};
    use crate::error::Result;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct NoopChat;

    #[async_trait]
    impl ChatClient for NoopChat {
        async fn get_response(
            &self,
            _request: &ChatRequest,
            _cancel: &CancellationToken,
        ) -> Result<ChatReply> {
            unreachable!("not called in these tests")
        }
    }

    fn context() -> (SceneContext, mpsc::UnboundedReceiver<SceneEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let ctx = SceneContext::new(
            "hi".into(),
            HashMap::new(),
            "key-1".into(),
            CacheBehavior::Normal,
            Arc::new(NoopChat),
            tx,
        );
        (ctx, rx)
    }

    #[tokio::test]
    async fn emit_stamps_seq_cost_and_key() {
        let (mut ctx, mut rx) = context();
        ctx.emit(SceneEvent::status(SceneStatus::Initializing));
        ctx.account_model_call(&Usage::default(), 0.25);
        ctx.emit(SceneEvent::status(SceneStatus::Running));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
        assert_eq!(first.total_cost, 0.0);
        assert_eq!(second.total_cost, 0.25);
        assert_eq!(second.conversation_key.as_deref(), Some("key-1"));
        assert_eq!(ctx.responses.len(), 2);
    }

    #[tokio::test]
    async fn streaming_events_are_delivered_but_not_recorded() {
        let (mut ctx, mut rx) = context();
        ctx.emit(SceneEvent::status(SceneStatus::Streaming).with_message("chu"));
        ctx.emit(SceneEvent::status(SceneStatus::Running).with_message("chunk"));
        assert_eq!(rx.recv().await.unwrap().status, SceneStatus::Streaming);
        assert_eq!(rx.recv().await.unwrap().status, SceneStatus::Running);
        assert_eq!(ctx.responses.len(), 1);
    }

    #[tokio::test]
    async fn scene_order_has_no_duplicates() {
        let (mut ctx, _rx) = context();
        ctx.record_scene_start("a");
        ctx.record_scene_start("b");
        ctx.record_scene_start("a");
        assert_eq!(ctx.executed_scene_order, vec!["a", "b"]);
    }

    #[test]
    fn over_budget_requires_a_configured_budget() {
        let (mut ctx, _rx) = context();
        ctx.total_cost = 10.0;
        assert!(!ctx.over_budget(None));
        assert!(ctx.over_budget(Some(5.0)));
        assert!(!ctx.over_budget(Some(10.0)));
    }
}
