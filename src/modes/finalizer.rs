//! Final-response synthesis after multi-step execution.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::chat::ChatRequest;
use crate::scene_loop::context::{ExecutionPhase, SceneContext};
use crate::scene_loop::events::{SceneEvent, SceneStatus};
use crate::types::settings::ResolvedSettings;
use crate::types::ModelMessage;

pub(crate) enum FinalizeOutcome {
    Done,
    BudgetExceeded,
    Failed,
    Cancelled,
}

/// Synthesize the closing answer from the accumulated per-scene results.
pub(crate) async fn synthesize_final_response(
    ctx: &mut SceneContext,
    settings: &ResolvedSettings,
    cancel: &CancellationToken,
) -> FinalizeOutcome {
    ctx.phase = ExecutionPhase::Finalizing;
    ctx.emit(SceneEvent::status(SceneStatus::GeneratingFinalResponse));

    let mut results = String::new();
    for scene in &ctx.executed_scene_order {
        if let Some(result) = ctx.scene_results.get(scene) {
            if !result.is_empty() {
                results.push_str(&format!("## {scene}\n{result}\n\n"));
            }
        }
    }

    let system = format!(
        "Synthesize one final answer to the user's request from the \
         per-scene results below. Do not mention the scenes themselves.\n\n{results}"
    );
    let request = ChatRequest {
        messages: vec![ModelMessage::system(system), ModelMessage::user(&ctx.input)],
        tools: Vec::new(),
        require_tool: None,
    };

    let chat = Arc::clone(&ctx.chat);
    let reply = tokio::select! {
        _ = cancel.cancelled() => return FinalizeOutcome::Cancelled,
        result = chat.get_response(&request, cancel) => match result {
            Ok(reply) => reply,
            Err(err) => {
                tracing::error!(error = %err, "final response generation failed");
                ctx.emit(
                    SceneEvent::status(SceneStatus::Error)
                        .with_message(format!("final response generation failed: {err}")),
                );
                return FinalizeOutcome::Failed;
            }
        },
    };

    ctx.account_model_call(&reply.usage, reply.cost);
    if ctx.over_budget(settings.max_budget) {
        ctx.emit_budget_exceeded(settings.max_budget.unwrap_or_default());
        return FinalizeOutcome::BudgetExceeded;
    }

    ctx.emit(
        SceneEvent::status(SceneStatus::Running)
            .with_usage(reply.usage.clone())
            .with_message(reply.message.text()),
    );
    FinalizeOutcome::Done
}
