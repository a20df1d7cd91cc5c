//! Execution-mode strategies: one handler per [`ExecutionMode`] variant,
//! selected through a lookup on the mode tag.

pub mod chaining;
pub mod direct;
pub mod finalizer;
pub mod planning;
pub mod scene;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use planning::{ExecutionPlan, PlanStep, Planner, PlannerVerdict};

use crate::chat::{ChatRequest, ToolDefinition};
use crate::mcp::McpConnector;
use crate::scene::{Scene, SceneRegistry};
use crate::scene_loop::context::SceneContext;
use crate::scene_loop::events::{SceneEvent, SceneStatus};
use crate::scene_loop::executor::{base_messages, SceneOutcome};
use crate::tools::ToolParameters;
use crate::types::settings::{ExecutionMode, ResolvedSettings};

/// How the whole request ended, as seen by the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RunOutcome {
    Completed,
    AwaitingClient,
    /// A terminal `Error`/`BudgetExceeded` event was already emitted.
    Aborted,
    Cancelled,
}

/// Shared collaborators handed to mode handlers.
pub(crate) struct ModeEnv<'a> {
    pub registry: &'a SceneRegistry,
    pub mcp: Option<&'a Arc<dyn McpConnector>>,
    pub planner: Option<&'a Arc<dyn Planner>>,
    pub settings: &'a ResolvedSettings,
}

/// Strategy selecting/sequencing which scene(s) run for one request.
#[async_trait]
pub(crate) trait ModeHandler: Send + Sync {
    async fn run(
        &self,
        ctx: &mut SceneContext,
        env: &ModeEnv<'_>,
        cancel: &CancellationToken,
    ) -> RunOutcome;
}

/// Resolve the handler for a mode tag.
pub(crate) fn handler_for(mode: ExecutionMode) -> &'static dyn ModeHandler {
    match mode {
        ExecutionMode::Direct => &direct::DirectMode,
        ExecutionMode::Scene => &scene::SceneMode,
        ExecutionMode::Planning => &planning::PlanningMode,
        ExecutionMode::DynamicChaining => &chaining::DynamicChainingMode,
    }
}

/// Map a single scene's outcome onto the request outcome for single-scene
/// flows (the scene-level `Error` event was already emitted on failure).
pub(crate) fn single_scene_outcome(outcome: SceneOutcome) -> RunOutcome {
    match outcome {
        SceneOutcome::Completed => RunOutcome::Completed,
        SceneOutcome::AwaitingClient => RunOutcome::AwaitingClient,
        SceneOutcome::BudgetExceeded | SceneOutcome::Failed => RunOutcome::Aborted,
        SceneOutcome::Cancelled => RunOutcome::Cancelled,
    }
}

/// What one selection-style model call produced.
pub(crate) enum Selection {
    Text(String),
    Tool(String, serde_json::Value),
    BudgetExceeded,
    Failed,
    Cancelled,
}

/// One blocking model call used for scene selection, continuation questions
/// and similar control turns. Accounts cost and checks the budget; only the
/// first returned call is honored.
pub(crate) async fn control_turn(
    ctx: &mut SceneContext,
    tools: Vec<ToolDefinition>,
    require_tool: Option<String>,
    max_budget: Option<f64>,
    cancel: &CancellationToken,
) -> Selection {
    let request = ChatRequest {
        messages: base_messages(ctx, ""),
        tools,
        require_tool,
    };
    let chat = Arc::clone(&ctx.chat);
    let reply = tokio::select! {
        _ = cancel.cancelled() => return Selection::Cancelled,
        result = chat.get_response(&request, cancel) => match result {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(error = %err, "control model call failed");
                ctx.emit(
                    SceneEvent::status(SceneStatus::Error)
                        .with_message(format!("model call failed: {err}")),
                );
                return Selection::Failed;
            }
        },
    };
    ctx.account_model_call(&reply.usage, reply.cost);
    if ctx.over_budget(max_budget) {
        ctx.emit_budget_exceeded(max_budget.unwrap_or_default());
        return Selection::BudgetExceeded;
    }
    match reply.message.tool_calls().first() {
        Some(call) => Selection::Tool(call.name.clone(), call.arguments.clone()),
        None => Selection::Text(reply.message.text()),
    }
}

/// Expose scenes to the model as zero-argument "select-me" tools.
pub(crate) fn selection_tools<'s>(
    scenes: impl IntoIterator<Item = &'s Arc<Scene>>,
) -> Vec<ToolDefinition> {
    scenes
        .into_iter()
        .map(|scene| ToolDefinition {
            name: scene.tool_safe_name(),
            description: scene.description().to_string(),
            parameters: ToolParameters::empty().schema,
        })
        .collect()
}
