//! Direct mode: the model picks at most one scene.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    control_turn, selection_tools, single_scene_outcome, ModeEnv, ModeHandler, RunOutcome,
    Selection,
};
use crate::scene_loop::context::SceneContext;
use crate::scene_loop::events::{SceneEvent, SceneStatus};
use crate::scene_loop::executor::SceneExecutor;

pub(crate) struct DirectMode;

#[async_trait]
impl ModeHandler for DirectMode {
    async fn run(
        &self,
        ctx: &mut SceneContext,
        env: &ModeEnv<'_>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let tools = selection_tools(env.registry.scenes());
        match control_turn(ctx, tools, None, env.settings.max_budget, cancel).await {
            Selection::Text(text) => {
                // The model answered in plain text instead of selecting a
                // scene; return it verbatim with no scene executed.
                ctx.emit(SceneEvent::status(SceneStatus::Running).with_message(text));
                RunOutcome::Completed
            }
            Selection::Tool(name, _) => match env.registry.resolve(&name) {
                Some(scene) => {
                    let scene = Arc::clone(scene);
                    let executor = SceneExecutor {
                        mcp: env.mcp,
                        settings: env.settings,
                    };
                    single_scene_outcome(executor.run(ctx, &scene, None, cancel).await)
                }
                None => {
                    tracing::error!(scene = %name, "model selected an unknown scene");
                    ctx.emit(
                        SceneEvent::status(SceneStatus::Error)
                            .with_scene(name.clone())
                            .with_message(format!("scene '{name}' not found")),
                    );
                    RunOutcome::Aborted
                }
            },
            Selection::BudgetExceeded | Selection::Failed => RunOutcome::Aborted,
            Selection::Cancelled => RunOutcome::Cancelled,
        }
    }
}
