//! SceneManager: the top-level request façade.
//!
//! One `execute` call runs the full lifecycle: rate limiting, memory and
//! cache load, main actors, mode dispatch, cache/memory save, completion.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chat::ChatClient;
use crate::error::TroupeError;
use crate::mcp::McpConnector;
use crate::modes::{handler_for, single_scene_outcome, ModeEnv, Planner, RunOutcome};
use crate::scene::{Actor, SceneRegistry};
use crate::scene_loop::context::{ContinuationState, ExecutionPhase, SceneContext};
use crate::scene_loop::events::{SceneEvent, SceneEventStream, SceneStatus};
use crate::scene_loop::executor::SceneExecutor;
use crate::services::cache::{LogSummarizer, ResponseCache};
use crate::services::memory::{MemoryStore, MemorySummarizer};
use crate::services::rate_limit::RateLimiter;
use crate::types::settings::{CacheBehavior, ExecuteSettings, ExecutionMode, ResolvedSettings};
use crate::types::{ContentPart, ModelMessage, ToolCall};

const DEFAULT_MAX_RECURSION_DEPTH: usize = 5;
const DEFAULT_MAX_DYNAMIC_SCENES: usize = 5;

/// One inbound request.
#[derive(Debug, Clone)]
pub struct SceneRequest {
    pub message: String,
    pub metadata: HashMap<String, String>,
    pub settings: ExecuteSettings,
}

impl SceneRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            metadata: HashMap::new(),
            settings: ExecuteSettings::default(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_settings(mut self, settings: ExecuteSettings) -> Self {
        self.settings = settings;
        self
    }
}

#[derive(Clone)]
struct ManagerInner {
    chat: Arc<dyn ChatClient>,
    registry: SceneRegistry,
    default_mode: ExecutionMode,
    main_actors: Vec<Actor>,
    rate_limiter: Option<Arc<dyn RateLimiter>>,
    rate_limit_fields: Vec<String>,
    cache: Option<Arc<dyn ResponseCache>>,
    cache_summarizer: Option<Arc<dyn LogSummarizer>>,
    memory_store: Option<Arc<dyn MemoryStore>>,
    memory_summarizer: Option<Arc<dyn MemorySummarizer>>,
    mcp: Option<Arc<dyn McpConnector>>,
    planner: Option<Arc<dyn Planner>>,
}

/// Top-level façade coordinating scenes and cross-cutting services.
pub struct SceneManager {
    inner: ManagerInner,
}

impl SceneManager {
    pub fn new(chat: Arc<dyn ChatClient>, registry: SceneRegistry) -> Self {
        Self {
            inner: ManagerInner {
                chat,
                registry,
                default_mode: ExecutionMode::Direct,
                main_actors: Vec::new(),
                rate_limiter: None,
                rate_limit_fields: Vec::new(),
                cache: None,
                cache_summarizer: None,
                memory_store: None,
                memory_summarizer: None,
                mcp: None,
                planner: None,
            },
        }
    }

    /// Execution mode used when a request does not override it.
    pub fn with_default_mode(mut self, mode: ExecutionMode) -> Self {
        self.inner.default_mode = mode;
        self
    }

    /// Add a main actor run before mode dispatch; its contribution becomes
    /// scene-level system context.
    pub fn with_main_actor(mut self, actor: Actor) -> Self {
        self.inner.main_actors.push(actor);
        self
    }

    /// Enable rate limiting. `key_fields` name the metadata fields joined
    /// into the composite per-caller key.
    pub fn with_rate_limiter(
        mut self,
        limiter: Arc<dyn RateLimiter>,
        key_fields: Vec<String>,
    ) -> Self {
        self.inner.rate_limiter = Some(limiter);
        self.inner.rate_limit_fields = key_fields;
        self
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.inner.cache = Some(cache);
        self
    }

    pub fn with_cache_summarizer(mut self, summarizer: Arc<dyn LogSummarizer>) -> Self {
        self.inner.cache_summarizer = Some(summarizer);
        self
    }

    pub fn with_memory(
        mut self,
        store: Arc<dyn MemoryStore>,
        summarizer: Arc<dyn MemorySummarizer>,
    ) -> Self {
        self.inner.memory_store = Some(store);
        self.inner.memory_summarizer = Some(summarizer);
        self
    }

    pub fn with_mcp(mut self, connector: Arc<dyn McpConnector>) -> Self {
        self.inner.mcp = Some(connector);
        self
    }

    pub fn with_planner(mut self, planner: Arc<dyn Planner>) -> Self {
        self.inner.planner = Some(planner);
        self
    }

    /// Execute one request. Events arrive on the returned stream; the
    /// stream closes after a terminal event, or silently on cancellation.
    pub fn execute(&self, request: SceneRequest, cancel: CancellationToken) -> SceneEventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_request(inner, request, tx, cancel).await;
        });
        SceneEventStream::new(rx)
    }
}

fn resolve_settings(inner: &ManagerInner, settings: &ExecuteSettings) -> ResolvedSettings {
    ResolvedSettings {
        conversation_key: settings
            .conversation_key
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        cache_behavior: settings.cache_behavior.unwrap_or_default(),
        mode: settings.mode.unwrap_or(inner.default_mode),
        scene_name: settings.scene_name.clone(),
        streaming: settings.streaming.unwrap_or(false),
        max_budget: settings.max_budget,
        max_recursion_depth: settings
            .max_recursion_depth
            .unwrap_or(DEFAULT_MAX_RECURSION_DEPTH),
        max_dynamic_scenes: settings
            .max_dynamic_scenes
            .unwrap_or(DEFAULT_MAX_DYNAMIC_SCENES),
        client_results: settings.client_results.clone().unwrap_or_default(),
    }
}

/// Composite rate-limit key from configured metadata fields. A missing
/// field degrades to literal "unknown" and never aborts on its own.
fn rate_limit_key(fields: &[String], metadata: &HashMap<String, String>) -> String {
    fields
        .iter()
        .map(|field| match metadata.get(field) {
            Some(value) => value.as_str(),
            None => {
                tracing::warn!(field = %field, "rate-limit metadata field missing, using 'unknown'");
                "unknown"
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

async fn run_request(
    inner: ManagerInner,
    request: SceneRequest,
    tx: mpsc::UnboundedSender<SceneEvent>,
    cancel: CancellationToken,
) {
    let settings = resolve_settings(&inner, &request.settings);
    let mut ctx = SceneContext::new(
        request.message,
        request.metadata,
        settings.conversation_key.clone(),
        settings.cache_behavior,
        Arc::clone(&inner.chat),
        tx,
    );
    tracing::debug!(
        conversation = %ctx.conversation_key,
        mode = %settings.mode,
        "request started"
    );
    ctx.emit(SceneEvent::status(SceneStatus::Initializing).with_message(ctx.input.clone()));

    // 2. Rate limiting, before any scene runs.
    if let Some(limiter) = &inner.rate_limiter {
        let key = rate_limit_key(&inner.rate_limit_fields, &ctx.metadata);
        let checked = tokio::select! {
            _ = cancel.cancelled() => return,
            checked = limiter.check_and_wait(&key, &cancel) => checked,
        };
        match checked {
            Ok(status) => {
                tracing::debug!(key = %key, remaining = status.remaining, "rate limit ok");
            }
            Err(TroupeError::RateLimited { retry_after }) => {
                let hint = retry_after
                    .map(|d| format!(", retry after {}s", d.as_secs()))
                    .unwrap_or_default();
                ctx.phase = ExecutionPhase::Failed;
                ctx.emit(
                    SceneEvent::status(SceneStatus::Error)
                        .with_message(format!("rate limit exceeded{hint}")),
                );
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "rate limiter failed, continuing");
            }
        }
    }

    // 3. Conversation memory load; failure degrades to absent.
    if let Some(store) = &inner.memory_store {
        match store.get(&ctx.conversation_key, &ctx.metadata, &cancel).await {
            Ok(memory) => ctx.memory = memory,
            Err(err) => tracing::warn!(error = %err, "memory load failed, continuing without"),
        }
    }

    // 4. Cache load. A plain hit is replayed to the caller and ends the
    // request without a model call; on resumption the log becomes context
    // history instead.
    let resuming = !settings.client_results.is_empty();
    if let Some(cache) = &inner.cache {
        if settings.cache_behavior == CacheBehavior::Normal || resuming {
            match cache.get(&ctx.conversation_key).await {
                Ok(Some(log)) => {
                    if resuming {
                        ctx.history = log;
                    } else {
                        replay_cached_log(&mut ctx, log, inner.cache_summarizer.as_deref());
                        return;
                    }
                }
                Ok(None) => {}
                Err(err) => tracing::warn!(error = %err, "cache load failed, continuing without"),
            }
        }
    }

    // 5. Main actors, in order.
    if !inner.main_actors.is_empty() {
        ctx.phase = ExecutionPhase::MainActors;
        ctx.emit(SceneEvent::status(SceneStatus::ExecutingMainActors));
        let input = ctx.actor_input();
        for actor in &inner.main_actors {
            match actor.contribute(&input).await {
                Ok(text) if !text.is_empty() => ctx.main_actor_context.push(text),
                Ok(_) => {}
                Err(err) => tracing::warn!(error = %err, "main actor failed, skipping"),
            }
        }
    }

    // 6. Mode dispatch (or continuation resume, which bypasses it).
    let outcome = if resuming {
        resume_continuation(&inner, &mut ctx, &settings, &cancel).await
    } else {
        let env = ModeEnv {
            registry: &inner.registry,
            mcp: inner.mcp.as_ref(),
            planner: inner.planner.as_ref(),
            settings: &settings,
        };
        handler_for(settings.mode).run(&mut ctx, &env, &cancel).await
    };

    // Cancellation performs none of the commit steps.
    if cancel.is_cancelled() {
        return;
    }

    match outcome {
        RunOutcome::Cancelled | RunOutcome::Aborted => {}
        RunOutcome::AwaitingClient => {
            // Resumption requires the log, so this persists even under
            // Avoidable behavior; the memory fold is skipped.
            persist_cache(&inner, &ctx, &settings).await;
        }
        RunOutcome::Completed => {
            let forced = ctx.executed_scene_order.iter().any(|name| {
                inner
                    .registry
                    .resolve(name)
                    .is_some_and(|scene| scene.cache_required())
            });
            if settings.cache_behavior == CacheBehavior::Normal || forced {
                persist_cache(&inner, &ctx, &settings).await;
            }
            persist_memory(&inner, &mut ctx, &cancel).await;
            ctx.phase = ExecutionPhase::Completed;
            ctx.emit(SceneEvent::status(SceneStatus::Completed));
            tracing::debug!(
                conversation = %ctx.conversation_key,
                total_cost = ctx.total_cost,
                "request completed"
            );
        }
    }
}

/// Re-emit a cached log (or its condensed summary) and finish.
fn replay_cached_log(
    ctx: &mut SceneContext,
    log: Vec<SceneEvent>,
    summarizer: Option<&dyn LogSummarizer>,
) {
    tracing::debug!(
        conversation = %ctx.conversation_key,
        events = log.len(),
        "replaying cached response log"
    );
    match summarizer {
        Some(summarizer) if summarizer.should_condense(&log) => {
            let condensed = summarizer.condense(&log);
            ctx.replay(condensed);
        }
        _ => {
            for event in log {
                ctx.replay(event);
            }
        }
    }
    let terminal = ctx
        .responses
        .last()
        .is_some_and(|event| event.status.is_terminal());
    if !terminal {
        ctx.phase = ExecutionPhase::Completed;
        ctx.emit(SceneEvent::status(SceneStatus::Completed));
    }
}

/// Resume a request paused on a client-side tool: re-derive the pending
/// continuation from the replayed log and run that scene directly,
/// bypassing mode dispatch.
async fn resume_continuation(
    inner: &ManagerInner,
    ctx: &mut SceneContext,
    settings: &ResolvedSettings,
    cancel: &CancellationToken,
) -> RunOutcome {
    let Some(pending) = ctx
        .history
        .iter()
        .rev()
        .find(|event| event.status == SceneStatus::AwaitingClient)
        .and_then(|event| {
            let request = event.continuation.clone()?;
            Some(ContinuationState {
                scene: event.scene.clone().unwrap_or_default(),
                interaction_id: request.interaction_id,
                call_id: request.call_id,
                call_name: request.call_name,
                arguments: request.arguments,
            })
        })
    else {
        ctx.emit(
            SceneEvent::status(SceneStatus::Error)
                .with_message("no pending client interaction for this conversation"),
        );
        return RunOutcome::Aborted;
    };

    let Some(scene) = inner.registry.resolve(&pending.scene) else {
        ctx.emit(
            SceneEvent::status(SceneStatus::Error)
                .with_scene(pending.scene.clone())
                .with_message(format!("scene '{}' not found", pending.scene)),
        );
        return RunOutcome::Aborted;
    };
    let scene = Arc::clone(scene);

    let Some(result) = settings
        .client_results
        .iter()
        .find(|result| result.interaction_id == pending.interaction_id)
    else {
        ctx.emit(SceneEvent::status(SceneStatus::Error).with_message(format!(
            "missing client result for interaction '{}'",
            pending.interaction_id
        )));
        return RunOutcome::Aborted;
    };

    tracing::debug!(
        conversation = %ctx.conversation_key,
        scene = %pending.scene,
        interaction = %pending.interaction_id,
        "resuming paused request"
    );

    // Inject the original assistant tool call and the supplied result,
    // correlated by the persisted call id.
    let assistant = ModelMessage::assistant_with(vec![ContentPart::ToolCall(ToolCall {
        id: pending.call_id.clone(),
        name: pending.call_name.clone(),
        arguments: pending.arguments.clone(),
    })]);
    let tool_result = ModelMessage::tool_result(pending.call_id.clone(), result.to_value(), false);
    ctx.continuation = Some(pending);

    let executor = SceneExecutor {
        mcp: inner.mcp.as_ref(),
        settings,
    };
    single_scene_outcome(
        executor
            .run(ctx, &scene, Some(vec![assistant, tool_result]), cancel)
            .await,
    )
}

/// Persist `history + responses` under the conversation key. The smallest
/// cache expiration among executed scenes becomes the entry TTL.
async fn persist_cache(inner: &ManagerInner, ctx: &SceneContext, settings: &ResolvedSettings) {
    let Some(cache) = &inner.cache else { return };
    let mut log = ctx.history.clone();
    log.extend(ctx.responses.iter().cloned());
    let ttl: Option<Duration> = ctx
        .executed_scene_order
        .iter()
        .filter_map(|name| inner.registry.resolve(name))
        .filter_map(|scene| scene.cache_expiration())
        .min();
    if let Err(err) = cache
        .set(&ctx.conversation_key, &log, settings.cache_behavior, ttl)
        .await
    {
        tracing::error!(error = %err, "cache save failed");
    }
}

/// Fold this request into conversation memory. A save failure is logged
/// and swallowed; it never fails the request.
async fn persist_memory(inner: &ManagerInner, ctx: &mut SceneContext, cancel: &CancellationToken) {
    let (Some(store), Some(summarizer)) = (&inner.memory_store, &inner.memory_summarizer) else {
        return;
    };
    let mut transcript = vec![ctx.input.clone()];
    transcript.extend(
        ctx.responses
            .iter()
            .filter(|event| event.status == SceneStatus::Running)
            .filter_map(|event| event.message.clone())
            .filter(|text| !text.is_empty()),
    );
    let folded = summarizer
        .summarize(
            ctx.memory.as_ref(),
            &ctx.input,
            &transcript,
            &ctx.metadata,
            Arc::clone(&ctx.chat),
            cancel,
        )
        .await;
    match folded {
        Ok(memory) => {
            if let Err(err) = store.set(&ctx.conversation_key, &memory, cancel).await {
                tracing::error!(error = %err, "memory save failed");
            } else {
                ctx.memory = Some(memory);
            }
        }
        Err(err) => tracing::error!(error = %err, "memory summarization failed"),
    }
}
