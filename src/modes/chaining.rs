//! Dynamic chaining mode: the model picks the next scene round by round.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::finalizer::{synthesize_final_response, FinalizeOutcome};
use super::{control_turn, selection_tools, ModeEnv, ModeHandler, RunOutcome, Selection};
use crate::chat::ToolDefinition;
use crate::scene::Scene;
use crate::scene_loop::context::SceneContext;
use crate::scene_loop::events::{SceneEvent, SceneStatus};
use crate::scene_loop::executor::{SceneExecutor, SceneOutcome};
use crate::tools::ToolParameters;

const CONTINUE_TOOL: &str = "continue_chain";

fn continue_tool() -> ToolDefinition {
    ToolDefinition {
        name: CONTINUE_TOOL.to_string(),
        description: "Decide whether another scene should run for this request".to_string(),
        parameters: ToolParameters::object()
            .boolean("continue", "true to run another scene, false to stop", true)
            .build()
            .schema,
    }
}

pub(crate) struct DynamicChainingMode;

#[async_trait]
impl ModeHandler for DynamicChainingMode {
    async fn run(
        &self,
        ctx: &mut SceneContext,
        env: &ModeEnv<'_>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let mut executed_any = false;

        for round in 0..env.settings.max_dynamic_scenes {
            let remaining: Vec<Arc<Scene>> = env
                .registry
                .scenes()
                .filter(|scene| !ctx.executed_scene_order.iter().any(|s| s == scene.name()))
                .cloned()
                .collect();
            if remaining.is_empty() {
                break;
            }

            let tools = selection_tools(remaining.iter());
            match control_turn(ctx, tools, None, env.settings.max_budget, cancel).await {
                Selection::Text(text) => {
                    if !executed_any {
                        // Nothing ran yet; the text is the verbatim answer.
                        ctx.emit(SceneEvent::status(SceneStatus::Running).with_message(text));
                        return RunOutcome::Completed;
                    }
                    break;
                }
                Selection::Tool(name, _) => {
                    let Some(scene) = env.registry.resolve(&name) else {
                        tracing::warn!(scene = %name, "model selected an unknown scene, ending chain");
                        break;
                    };
                    let scene = Arc::clone(scene);
                    let executor = SceneExecutor {
                        mcp: env.mcp,
                        settings: env.settings,
                    };
                    match executor.run(ctx, &scene, None, cancel).await {
                        SceneOutcome::Completed | SceneOutcome::Failed => executed_any = true,
                        SceneOutcome::AwaitingClient => return RunOutcome::AwaitingClient,
                        SceneOutcome::BudgetExceeded => return RunOutcome::Aborted,
                        SceneOutcome::Cancelled => return RunOutcome::Cancelled,
                    }
                }
                Selection::BudgetExceeded | Selection::Failed => return RunOutcome::Aborted,
                Selection::Cancelled => return RunOutcome::Cancelled,
            }

            let none_left = env
                .registry
                .scenes()
                .all(|scene| ctx.executed_scene_order.iter().any(|s| s == scene.name()));
            if none_left || round + 1 == env.settings.max_dynamic_scenes {
                break;
            }

            // Forced yes/no continuation decision.
            match control_turn(
                ctx,
                vec![continue_tool()],
                Some(CONTINUE_TOOL.to_string()),
                env.settings.max_budget,
                cancel,
            )
            .await
            {
                Selection::Tool(name, args) if name == CONTINUE_TOOL => {
                    if args.get("continue").and_then(|v| v.as_bool()) != Some(true) {
                        tracing::debug!("model chose to stop the chain");
                        break;
                    }
                }
                // Malformed or textual replies stop the chain.
                Selection::Tool(_, _) | Selection::Text(_) => break,
                Selection::BudgetExceeded | Selection::Failed => return RunOutcome::Aborted,
                Selection::Cancelled => return RunOutcome::Cancelled,
            }
        }

        match synthesize_final_response(ctx, env.settings, cancel).await {
            FinalizeOutcome::Done => RunOutcome::Completed,
            FinalizeOutcome::BudgetExceeded | FinalizeOutcome::Failed => RunOutcome::Aborted,
            FinalizeOutcome::Cancelled => RunOutcome::Cancelled,
        }
    }
}
