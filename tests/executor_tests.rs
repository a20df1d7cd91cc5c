//! Tool-loop behavior: iteration cap, budget, tool failures, streaming.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use common::{assert_cost_monotonic, statuses, ScriptedChatClient};
use troupe::prelude::*;
use troupe::types::ContentPart;

fn scene_mode_settings(scene: &str) -> ExecuteSettings {
    ExecuteSettings::builder()
        .mode(ExecutionMode::Scene)
        .scene_name(scene.to_string())
        .build()
}

fn manager_with(chat: Arc<ScriptedChatClient>, scene: Scene) -> SceneManager {
    let mut registry = SceneRegistry::new();
    registry.register(scene);
    SceneManager::new(chat, registry)
}

fn noop_tool() -> SceneTool {
    SceneTool::new(
        "noop",
        "Does nothing",
        ToolParameters::empty(),
        |_args, _ctx| async { Ok(serde_json::json!({"ok": true})) },
    )
}

#[tokio::test]
async fn loop_terminates_at_iteration_cap() {
    let chat = Arc::new(ScriptedChatClient::new().with_repeat_last());
    chat.push_tool_call("c1", "noop", serde_json::json!({}), 0.001);

    let manager = manager_with(chat.clone(), Scene::new("echo", "").with_tool(noop_tool()));
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(scene_mode_settings("echo")),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let last = events.last().unwrap();
    assert_eq!(last.status, SceneStatus::Error);
    assert!(last
        .message
        .as_deref()
        .unwrap()
        .contains("maximum tool-call iterations"));
    assert_eq!(chat.call_count(), 10);
    assert_cost_monotonic(&events);
}

#[tokio::test]
async fn budget_breach_stops_the_request() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_text("expensive answer", 0.02);
    chat.push_text("never reached", 0.02);

    let manager = manager_with(chat.clone(), Scene::new("echo", ""));
    let settings = ExecuteSettings::builder()
        .mode(ExecutionMode::Scene)
        .scene_name("echo".to_string())
        .max_budget(0.01)
        .build();
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(settings),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let breaches: Vec<_> = events
        .iter()
        .filter(|event| event.status == SceneStatus::BudgetExceeded)
        .collect();
    assert_eq!(breaches.len(), 1);
    assert_eq!(events.last().unwrap().status, SceneStatus::BudgetExceeded);
    // No further model call after the breach was detected.
    assert_eq!(chat.call_count(), 1);
}

#[tokio::test]
async fn tool_failure_is_fed_back_and_loop_continues() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_tool_call("c1", "boom", serde_json::json!({}), 0.0);
    chat.push_text("recovered", 0.0);

    let boom = SceneTool::new("boom", "Always fails", ToolParameters::empty(), |_a, _c| async {
        Err(TroupeError::tool("boom", "exploded"))
    });
    let manager = manager_with(chat.clone(), Scene::new("echo", "").with_tool(boom));
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(scene_mode_settings("echo")),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let progress = events
        .iter()
        .find(|event| event.status == SceneStatus::FunctionCompleted)
        .unwrap();
    assert!(progress.message.as_deref().unwrap().contains("failed"));
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);

    // The model saw a tool-error result message on the second call.
    let requests = chat.requests.lock().unwrap();
    let saw_error_result = requests[1].messages.iter().any(|message| {
        message.content.iter().any(|part| {
            matches!(part, ContentPart::ToolResult(result) if result.is_error)
        })
    });
    assert!(saw_error_result);
}

#[tokio::test]
async fn unknown_tool_call_self_heals() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_tool_call("c1", "ghost", serde_json::json!({}), 0.0);
    chat.push_text("done", 0.0);

    let manager = manager_with(chat.clone(), Scene::new("echo", ""));
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(scene_mode_settings("echo")),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let progress = events
        .iter()
        .find(|event| event.status == SceneStatus::FunctionCompleted)
        .unwrap();
    assert!(progress.message.as_deref().unwrap().contains("not found"));
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
    assert_eq!(chat.call_count(), 2);
}

#[tokio::test]
async fn streaming_forwards_chunks_and_final_text() {
    let chat = Arc::new(ScriptedChatClient::new());
    chat.push_text("Hello world", 0.0);

    let manager = manager_with(chat.clone(), Scene::new("echo", ""));
    let settings = ExecuteSettings::builder()
        .mode(ExecutionMode::Scene)
        .scene_name("echo".to_string())
        .streaming(true)
        .build();
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(settings),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let all = statuses(&events);
    let streaming_at = all
        .iter()
        .position(|s| *s == SceneStatus::Streaming)
        .unwrap();
    let running_at = all.iter().position(|s| *s == SceneStatus::Running).unwrap();
    assert!(streaming_at < running_at);
    // The scene-final event carries the full text even though it streamed.
    assert_eq!(
        events[running_at].message.as_deref(),
        Some("Hello world")
    );
    assert_eq!(events.last().unwrap().status, SceneStatus::Completed);
}

#[tokio::test]
async fn model_failure_is_fatal_for_the_scene() {
    let chat = Arc::new(ScriptedChatClient::new());
    // Empty script: the first call fails.

    let manager = manager_with(chat.clone(), Scene::new("echo", ""));
    let events = manager
        .execute(
            SceneRequest::new("go").with_settings(scene_mode_settings("echo")),
            CancellationToken::new(),
        )
        .drain()
        .await;

    let last = events.last().unwrap();
    assert_eq!(last.status, SceneStatus::Error);
    assert!(last.message.as_deref().unwrap().contains("model call failed"));
}
