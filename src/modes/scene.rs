//! Scene mode: run the caller-named scene directly, bypassing selection.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{single_scene_outcome, ModeEnv, ModeHandler, RunOutcome};
use crate::scene_loop::context::SceneContext;
use crate::scene_loop::events::{SceneEvent, SceneStatus};
use crate::scene_loop::executor::SceneExecutor;

pub(crate) struct SceneMode;

#[async_trait]
impl ModeHandler for SceneMode {
    async fn run(
        &self,
        ctx: &mut SceneContext,
        env: &ModeEnv<'_>,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let Some(name) = env.settings.scene_name.as_deref() else {
            ctx.emit(
                SceneEvent::status(SceneStatus::Error)
                    .with_message("scene mode requires a scene name"),
            );
            return RunOutcome::Aborted;
        };
        let Some(scene) = env.registry.resolve(name) else {
            ctx.emit(
                SceneEvent::status(SceneStatus::Error)
                    .with_scene(name)
                    .with_message(format!("scene '{name}' not found")),
            );
            return RunOutcome::Aborted;
        };
        let scene = Arc::clone(scene);
        let executor = SceneExecutor {
            mcp: env.mcp,
            settings: env.settings,
        };
        single_scene_outcome(executor.run(ctx, &scene, None, cancel).await)
    }
}
