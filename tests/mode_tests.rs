//! Mode handler behavior: direct selection, planning, dynamic chaining.

mod common;

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{executed_scenes, ScriptedChatClient};
use troupe::prelude::*;

fn manager(chat: Arc<ScriptedChatClient>, scenes: Vec<Scene>) -> SceneManager {
    let mut registry = SceneRegistry::new();
    for scene in scenes {
        registry.register(scene);
    }
    SceneManager::new(chat, registry)
}

fn mode_settings(mode: ExecutionMode) -> ExecuteSettings {
    ExecuteSettings::builder().mode(mode).build()
}

struct StubPlanner {
    verdict: PlannerVerdict,
}

#[async_trait]
impl Planner for StubPlanner {
    async fn plan(
        &self,
        _ctx: &SceneContext,
        _registry: &SceneRegistry,
        _cancel: &CancellationToken,
    ) -> Result<PlannerVerdict> {
        Ok(self.verdict.clone())
    }
}

#[tokio::test]
async fn direct_text_reply_is_returned_verbatim() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_text("just an answer", 0.0);

    let manager = manager(chat.clone(), vec![Scene::new("alpha", "First scene")]);
    let events = manager
        .execute(
            SceneRequest::new("hi").with_settings(mode_settings(ExecutionMode::Direct)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let running = events
        .iter()
        .find(|event| event.status == SceneStatus::Running)
        .unwrap();
    assert_eq!(running.message.as_deref(), Some("just an answer"));
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
    assert!(executed_scenes(&events).is_empty());
    assert_eq!(chat.call_count(), 1);
}

#[tokio::test]
async fn direct_selection_resolves_tool_safe_names() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_tool_call("s1", "Data_Lookup", serde_json::json!({}), 0.0);
    chat.push_text("found it", 0.0);

    let manager = manager(
        chat.clone(),
        vec![Scene::new("Data Lookup", "Looks up data")],
    );
    let events = manager
        .execute(
            SceneRequest::new("find x").with_settings(mode_settings(ExecutionMode::Direct)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    assert_eq!(executed_scenes(&events), vec!["Data Lookup"]);
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
}

#[tokio::test]
async fn direct_unknown_selection_is_an_error() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_tool_call("s1", "Foo_Bar", serde_json::json!({}), 0.0);

    let manager = manager(chat.clone(), vec![Scene::new("alpha", "")]);
    let events = manager
        .execute(
            SceneRequest::new("hi").with_settings(mode_settings(ExecutionMode::Direct)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let last = events.last().unwrap();
    assert_eq!(last.status, SceneStatus::Error);
    assert!(last.message.as_deref().unwrap().contains("Foo_Bar"));
    assert_eq!(chat.call_count(), 1);
}

#[tokio::test]
async fn planning_executes_steps_in_number_order() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_text("alpha result", 0.0);
    chat.push_text("beta result", 0.0);
    chat.push_text("combined answer", 0.0);

    let planner = StubPlanner {
        verdict: PlannerVerdict::Plan(ExecutionPlan {
            steps: vec![PlanStep::new(2, "beta"), PlanStep::new(1, "alpha")],
        }),
    };
    let manager = manager(
        chat.clone(),
        vec![Scene::new("alpha", ""), Scene::new("beta", "")],
    )
    .with_planner(Arc::new(planner));
    let events = manager
        .execute(
            SceneRequest::new("do both").with_settings(mode_settings(ExecutionMode::Planning)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    assert_eq!(executed_scenes(&events), vec!["alpha", "beta"]);
    let final_text = events
        .iter()
        .rev()
        .find(|event| event.status == SceneStatus::Running)
        .unwrap();
    assert_eq!(final_text.message.as_deref(), Some("combined answer"));
    assert!(events
        .iter()
        .any(|event| event.status == SceneStatus::GeneratingFinalResponse));
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
}

#[tokio::test]
async fn planning_no_execution_answers_directly() {
    let chat = Arc::new(ScriptedChatClient::new());
    let planner = StubPlanner {
        verdict: PlannerVerdict::NoExecution {
            reasoning: "nothing to do".to_string(),
        },
    };
    let manager = manager(chat.clone(), vec![Scene::new("alpha", "")])
        .with_planner(Arc::new(planner));
    let events = manager
        .execute(
            SceneRequest::new("hi").with_settings(mode_settings(ExecutionMode::Planning)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let running = events
        .iter()
        .find(|event| event.status == SceneStatus::Running)
        .unwrap();
    assert_eq!(running.message.as_deref(), Some("nothing to do"));
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
    assert_eq!(chat.call_count(), 0);
}

#[tokio::test]
async fn planning_skips_unknown_steps() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_text("alpha result", 0.0);
    chat.push_text("answer", 0.0);

    let planner = StubPlanner {
        verdict: PlannerVerdict::Plan(ExecutionPlan {
            steps: vec![PlanStep::new(1, "alpha"), PlanStep::new(2, "ghost")],
        }),
    };
    let manager = manager(chat.clone(), vec![Scene::new("alpha", "")])
        .with_planner(Arc::new(planner));
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(mode_settings(ExecutionMode::Planning)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let skipped = events
        .iter()
        .find(|event| event.status == SceneStatus::StepSkipped)
        .unwrap();
    assert_eq!(skipped.scene.as_deref(), Some("ghost"));
    assert!(skipped.message.as_deref().unwrap().contains("not found"));
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
}

#[tokio::test]
async fn planning_enforces_the_recursion_depth_limit() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_text("alpha result", 0.0);
    chat.push_text("answer", 0.0);

    let planner = StubPlanner {
        verdict: PlannerVerdict::Plan(ExecutionPlan {
            steps: vec![PlanStep::new(1, "alpha"), PlanStep::new(2, "beta")],
        }),
    };
    let manager = manager(
        chat.clone(),
        vec![Scene::new("alpha", ""), Scene::new("beta", "")],
    )
    .with_planner(Arc::new(planner));
    let settings = ExecuteSettings::builder()
        .mode(ExecutionMode::Planning)
        .max_recursion_depth(1)
        .build();
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(settings),
            CancellationToken::new(),
        )
        .drain()
        .await;

    assert_eq!(executed_scenes(&events), vec!["alpha"]);
    let skipped = events
        .iter()
        .find(|event| event.status == SceneStatus::StepSkipped)
        .unwrap();
    assert!(skipped.message.as_deref().unwrap().contains("depth"));
}

#[tokio::test]
async fn planning_without_a_planner_is_an_error() {
    let chat = Arc::new(ScriptedChatClient::new());
    let manager = manager(chat.clone(), vec![Scene::new("alpha", "")]);
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(mode_settings(ExecutionMode::Planning)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let last = events.last().unwrap();
    assert_eq!(last.status, SceneStatus::Error);
    assert!(last.message.as_deref().unwrap().contains("planner"));
    assert_eq!(chat.call_count(), 0);
}

#[tokio::test]
async fn chaining_runs_distinct_scenes_then_finalizes() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_tool_call("s1", "alpha", serde_json::json!({}), 0.0);
    chat.push_text("alpha result", 0.0);
    chat.push_tool_call("k1", "continue_chain", serde_json::json!({"continue": true}), 0.0);
    chat.push_tool_call("s2", "beta", serde_json::json!({}), 0.0);
    chat.push_text("beta result", 0.0);
    chat.push_text("combined answer", 0.0);

    let manager = manager(
        chat.clone(),
        vec![Scene::new("alpha", ""), Scene::new("beta", "")],
    );
    let events = manager
        .execute(
            SceneRequest::new("do everything")
                .with_settings(mode_settings(ExecutionMode::DynamicChaining)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    assert_eq!(executed_scenes(&events), vec!["alpha", "beta"]);
    let final_text = events
        .iter()
        .rev()
        .find(|event| event.status == SceneStatus::Running)
        .unwrap();
    assert_eq!(final_text.message.as_deref(), Some("combined answer"));
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
    assert_eq!(chat.call_count(), 6);
}

#[tokio::test]
async fn chaining_stops_when_the_model_declines_to_continue() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_tool_call("s1", "alpha", serde_json::json!({}), 0.0);
    chat.push_text("alpha result", 0.0);
    chat.push_tool_call("k1", "continue_chain", serde_json::json!({"continue": false}), 0.0);
    chat.push_text("answer", 0.0);

    let manager = manager(
        chat.clone(),
        vec![Scene::new("alpha", ""), Scene::new("beta", "")],
    );
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(mode_settings(ExecutionMode::DynamicChaining)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    assert_eq!(executed_scenes(&events), vec!["alpha"]);
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
    assert_eq!(chat.call_count(), 4);
}

#[tokio::test]
async fn chaining_text_with_nothing_run_is_the_answer() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_text("direct answer", 0.0);

    let manager = manager(chat.clone(), vec![Scene::new("alpha", "")]);
    let events = manager
        .execute(
            SceneRequest::new("hi").with_settings(mode_settings(ExecutionMode::DynamicChaining)),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let running = events
        .iter()
        .find(|event| event.status == SceneStatus::Running)
        .unwrap();
    assert_eq!(running.message.as_deref(), Some("direct answer"));
    assert!(!events
        .iter()
        .any(|event| event.status == SceneStatus::GeneratingFinalResponse));
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
    assert_eq!(chat.call_count(), 1);
}
