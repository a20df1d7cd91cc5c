//! Planning mode: a planner produces an ordered multi-step plan.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::finalizer::{synthesize_final_response, FinalizeOutcome};
use super::{ModeEnv, ModeHandler, RunOutcome};
use crate::error::Result;
use crate::scene::SceneRegistry;
use crate::scene_loop::context::SceneContext;
use crate::scene_loop::events::{SceneEvent, SceneStatus};
use crate::scene_loop::executor::{SceneExecutor, SceneOutcome};

/// One step of an execution plan.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanStep {
    pub number: u32,
    pub scene: String,
    pub completed: bool,
}

impl PlanStep {
    pub fn new(number: u32, scene: impl Into<String>) -> Self {
        Self {
            number,
            scene: scene.into(),
            completed: false,
        }
    }
}

/// Ordered plan created once per request; owned exclusively by that request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionPlan {
    pub steps: Vec<PlanStep>,
}

/// What the planner decided.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannerVerdict {
    /// No scene execution needed; the reasoning is the final answer.
    NoExecution { reasoning: String },
    Plan(ExecutionPlan),
}

/// Planning collaborator. Asked once per Planning-mode request.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        ctx: &SceneContext,
        registry: &SceneRegistry,
        cancel: &CancellationToken,
    ) -> Result<PlannerVerdict>;
}

pub(crate) struct PlanningMode;

#[async_trait]
impl ModeHandler for PlanningMode {
    async fn run(
        &self,
        ctx: &mut SceneContext,
        env: &ModeEnv<'_>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let Some(planner) = env.planner else {
            ctx.emit(
                SceneEvent::status(SceneStatus::Error)
                    .with_message("planning mode requires a registered planner"),
            );
            return RunOutcome::Aborted;
        };

        ctx.emit(SceneEvent::status(SceneStatus::Planning).with_message("creating execution plan"));
        let verdict = tokio::select! {
            _ = cancel.cancelled() => return RunOutcome::Cancelled,
            verdict = planner.plan(ctx, env.registry, cancel) => match verdict {
                Ok(verdict) => verdict,
                Err(err) => {
                    tracing::error!(error = %err, "planner failed");
                    ctx.emit(
                        SceneEvent::status(SceneStatus::Error)
                            .with_message(format!("planner failed: {err}")),
                    );
                    return RunOutcome::Aborted;
                }
            },
        };

        let mut plan = match verdict {
            PlannerVerdict::NoExecution { reasoning } => {
                ctx.emit(SceneEvent::status(SceneStatus::Running).with_message(reasoning));
                return RunOutcome::Completed;
            }
            PlannerVerdict::Plan(plan) => plan,
        };

        // Steps execute strictly in ascending step-number order.
        plan.steps.sort_by_key(|step| step.number);
        tracing::debug!(steps = plan.steps.len(), "executing plan");

        for (index, step) in plan.steps.iter_mut().enumerate() {
            if index >= env.settings.max_recursion_depth {
                ctx.emit(
                    SceneEvent::status(SceneStatus::StepSkipped)
                        .with_scene(step.scene.clone())
                        .with_message(format!(
                            "step {} skipped: recursion depth limit {} reached",
                            step.number, env.settings.max_recursion_depth
                        )),
                );
                continue;
            }
            let Some(scene) = env.registry.resolve(&step.scene) else {
                // Unresolved step: reported and skipped, never aborts the
                // plan.
                ctx.emit(
                    SceneEvent::status(SceneStatus::StepSkipped)
                        .with_scene(step.scene.clone())
                        .with_message(format!(
                            "step {} skipped: scene '{}' not found",
                            step.number, step.scene
                        )),
                );
                continue;
            };
            let scene = Arc::clone(scene);
            let executor = SceneExecutor {
                mcp: env.mcp,
                settings: env.settings,
            };
            match executor.run(ctx, &scene, None, cancel).await {
                SceneOutcome::Completed => step.completed = true,
                // Fatal for this step only; remaining steps still run.
                SceneOutcome::Failed => {}
                SceneOutcome::AwaitingClient => return RunOutcome::AwaitingClient,
                SceneOutcome::BudgetExceeded => return RunOutcome::Aborted,
                SceneOutcome::Cancelled => return RunOutcome::Cancelled,
            }
        }

        match synthesize_final_response(ctx, env.settings, cancel).await {
            FinalizeOutcome::Done => RunOutcome::Completed,
            FinalizeOutcome::BudgetExceeded | FinalizeOutcome::Failed => RunOutcome::Aborted,
            FinalizeOutcome::Cancelled => RunOutcome::Cancelled,
        }
    }
}
