//! The per-scene tool-calling loop.

use std::sync::Arc;

use chrono::Utc;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::chat::{ChatReply, ChatRequest, ToolDefinition};
use crate::mcp::{McpConnector, McpToolAdapter};
use crate::scene::Scene;
use crate::scene_loop::context::{ContinuationState, ExecutionPhase, SceneContext};
use crate::scene_loop::events::{ClientToolRequest, SceneEvent, SceneStatus};
use crate::tools::{Tool, ToolArguments, ToolExecutionContext};
use crate::types::{ContentPart, ImageContent, ModelMessage, Role, ToolCall, Usage};
use crate::types::settings::ResolvedSettings;

/// Hard cap on model-call iterations within one scene.
pub(crate) const MAX_TOOL_ITERATIONS: usize = 10;

/// How one scene execution ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SceneOutcome {
    Completed,
    AwaitingClient,
    BudgetExceeded,
    /// Fatal for this scene only; a multi-scene flow may continue past it.
    Failed,
    Cancelled,
}

enum ModelCallEnd {
    Cancelled,
    Unavailable(String),
}

/// Runs the tool-calling loop for one scene.
pub(crate) struct SceneExecutor<'a> {
    pub mcp: Option<&'a Arc<dyn McpConnector>>,
    pub settings: &'a ResolvedSettings,
}

impl SceneExecutor<'_> {
    /// Execute `scene` against the context. `resume` seeds the live exchange
    /// with the re-correlated client tool call and its result when resuming
    /// a paused request.
    pub(crate) async fn run(
        &self,
        ctx: &mut SceneContext,
        scene: &Scene,
        resume: Option<Vec<ModelMessage>>,
        cancel: &CancellationToken,
    ) -> SceneOutcome {
        ctx.phase = ExecutionPhase::Running;
        ctx.record_scene_start(scene.name());
        ctx.emit(SceneEvent::status(SceneStatus::ExecutingScene).with_scene(scene.name()));

        let (tools, mcp_system) = self.assemble_tools(scene, cancel).await;
        let system_context = self.build_system_context(ctx, scene, &mcp_system).await;

        let mut tool_defs: Vec<ToolDefinition> = tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters().schema.clone(),
            })
            .collect();
        for client_tool in scene.client_tools() {
            tool_defs.push(ToolDefinition {
                name: client_tool.name.clone(),
                description: client_tool.description.clone(),
                parameters: client_tool.parameters.schema.clone(),
            });
        }

        let mut live: Vec<ModelMessage> = resume.unwrap_or_default();

        for iteration in 1..=MAX_TOOL_ITERATIONS {
            let mut messages = base_messages(ctx, &system_context);
            messages.extend(live.iter().cloned());
            let request = ChatRequest {
                messages,
                tools: tool_defs.clone(),
                require_tool: None,
            };

            let reply = match self.call_model(ctx, scene.name(), &request, cancel).await {
                Ok(reply) => reply,
                Err(ModelCallEnd::Cancelled) => return SceneOutcome::Cancelled,
                Err(ModelCallEnd::Unavailable(message)) => {
                    tracing::error!(scene = %scene.name(), error = %message, "model call failed");
                    ctx.phase = ExecutionPhase::Failed;
                    ctx.emit(
                        SceneEvent::status(SceneStatus::Error)
                            .with_scene(scene.name())
                            .with_message(format!("model call failed: {message}")),
                    );
                    return SceneOutcome::Failed;
                }
            };

            ctx.account_model_call(&reply.usage, reply.cost);
            if ctx.over_budget(self.settings.max_budget) {
                ctx.emit_budget_exceeded(self.settings.max_budget.unwrap_or_default());
                return SceneOutcome::BudgetExceeded;
            }

            let calls: Vec<ToolCall> = reply.message.tool_calls().into_iter().cloned().collect();
            tracing::debug!(
                scene = %scene.name(),
                iteration,
                tool_calls = calls.len(),
                "scene iteration complete"
            );
            live.push(reply.message.clone());

            if calls.is_empty() {
                // Normal termination: the model answered with text. The
                // final event always carries the full text, streamed or not.
                let text = reply.message.text();
                ctx.scene_results
                    .insert(scene.name().to_string(), text.clone());
                ctx.phase = ExecutionPhase::Completed;
                ctx.emit(
                    SceneEvent::status(SceneStatus::Running)
                        .with_scene(scene.name())
                        .with_usage(reply.usage.clone())
                        .with_message(text),
                );
                return SceneOutcome::Completed;
            }

            for call in calls {
                if scene.client_tool(&call.name).is_some() {
                    return self.pause_for_client(ctx, scene, call);
                }
                let result_message = self.run_server_tool(ctx, scene, &tools, &call, cancel).await;
                live.push(result_message);
            }
        }

        tracing::error!(scene = %scene.name(), "maximum tool-call iterations reached");
        ctx.phase = ExecutionPhase::Failed;
        ctx.emit(
            SceneEvent::status(SceneStatus::Error)
                .with_scene(scene.name())
                .with_message("maximum tool-call iterations reached"),
        );
        SceneOutcome::Failed
    }

    /// Scene tools ∪ MCP tools, plus the MCP system message. MCP failures
    /// degrade to the scene's own tools with a warning.
    async fn assemble_tools(
        &self,
        scene: &Scene,
        cancel: &CancellationToken,
    ) -> (Vec<Arc<dyn Tool>>, String) {
        let mut tools: Vec<Arc<dyn Tool>> = scene.tools().to_vec();
        let mut mcp_system = String::new();
        let Some(connector) = self.mcp else {
            return (tools, mcp_system);
        };
        if scene.mcp_references().is_empty() {
            return (tools, mcp_system);
        }
        match connector.get_tools(scene.mcp_references(), cancel).await {
            Ok(schemas) => {
                for schema in schemas {
                    tools.push(Arc::new(McpToolAdapter::new(schema, Arc::clone(connector))));
                }
            }
            Err(err) => {
                tracing::warn!(scene = %scene.name(), error = %err, "failed to list MCP tools");
            }
        }
        match connector
            .build_system_message(scene.mcp_references(), cancel)
            .await
        {
            Ok(message) => mcp_system = message,
            Err(err) => {
                tracing::warn!(scene = %scene.name(), error = %err, "failed to build MCP system message");
            }
        }
        (tools, mcp_system)
    }

    /// System context: main-actor contributions, then scene actors, then the
    /// MCP system message, then recalled conversation memory.
    async fn build_system_context(
        &self,
        ctx: &SceneContext,
        scene: &Scene,
        mcp_system: &str,
    ) -> String {
        let mut parts: Vec<String> = ctx.main_actor_context.clone();
        let input = ctx.actor_input();
        for actor in scene.actors() {
            match actor.contribute(&input).await {
                Ok(text) if !text.is_empty() => parts.push(text),
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(scene = %scene.name(), error = %err, "scene actor failed, skipping");
                }
            }
        }
        if !mcp_system.is_empty() {
            parts.push(mcp_system.to_string());
        }
        if let Some(memory) = &ctx.memory {
            if !memory.content.is_empty() {
                parts.push(format!(
                    "Relevant conversation memory:\n{}",
                    memory.content
                ));
            }
        }
        parts.join("\n\n")
    }

    /// One model call, blocking or streaming per the request settings.
    /// Streamed text chunks are forwarded optimistically as `Streaming`
    /// events and never retracted.
    async fn call_model(
        &self,
        ctx: &mut SceneContext,
        scene_name: &str,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatReply, ModelCallEnd> {
        let chat = Arc::clone(&ctx.chat);
        if !self.settings.streaming {
            return tokio::select! {
                _ = cancel.cancelled() => Err(ModelCallEnd::Cancelled),
                result = chat.get_response(request, cancel) => {
                    result.map_err(|err| ModelCallEnd::Unavailable(err.to_string()))
                }
            };
        }

        let mut stream = tokio::select! {
            _ = cancel.cancelled() => return Err(ModelCallEnd::Cancelled),
            result = chat.stream_response(request, cancel) => match result {
                Ok(stream) => stream,
                Err(err) => return Err(ModelCallEnd::Unavailable(err.to_string())),
            },
        };

        let mut text = String::new();
        let mut calls: Vec<ToolCall> = Vec::new();
        let mut usage = Usage::default();
        let mut cost = 0.0;
        loop {
            let delta = tokio::select! {
                _ = cancel.cancelled() => return Err(ModelCallEnd::Cancelled),
                delta = stream.next() => delta,
            };
            let Some(delta) = delta else { break };
            let delta = match delta {
                Ok(delta) => delta,
                Err(err) => return Err(ModelCallEnd::Unavailable(err.to_string())),
            };
            if let Some(chunk) = delta.text {
                if !chunk.is_empty() {
                    text.push_str(&chunk);
                    ctx.append_streamed(scene_name, &chunk);
                    ctx.emit(
                        SceneEvent::status(SceneStatus::Streaming)
                            .with_scene(scene_name)
                            .with_message(chunk),
                    );
                }
            }
            if let Some(call) = delta.tool_call {
                calls.push(call);
            }
            if let Some(delta_usage) = delta.usage {
                usage.merge(&delta_usage);
            }
            if let Some(delta_cost) = delta.cost {
                cost += delta_cost;
            }
        }

        let mut content: Vec<ContentPart> = Vec::new();
        if !text.is_empty() {
            content.push(ContentPart::Text { text });
        }
        for call in calls {
            content.push(ContentPart::ToolCall(call));
        }
        Ok(ChatReply {
            message: ModelMessage::assistant_with(content),
            usage,
            cost,
        })
    }

    /// Persist the continuation and stop the whole scene immediately;
    /// control returns to the caller.
    fn pause_for_client(
        &self,
        ctx: &mut SceneContext,
        scene: &Scene,
        call: ToolCall,
    ) -> SceneOutcome {
        tracing::debug!(scene = %scene.name(), tool = %call.name, "pausing for client-side tool");
        let state = ContinuationState {
            scene: scene.name().to_string(),
            interaction_id: call.name.clone(),
            call_id: call.id.clone(),
            call_name: call.name.clone(),
            arguments: call.arguments.clone(),
        };
        let request = ClientToolRequest {
            interaction_id: state.interaction_id.clone(),
            call_id: state.call_id.clone(),
            call_name: state.call_name.clone(),
            arguments: state.arguments.clone(),
        };
        ctx.continuation = Some(state);
        ctx.phase = ExecutionPhase::AwaitingClient;
        ctx.emit(
            SceneEvent::status(SceneStatus::AwaitingClient)
                .with_scene(scene.name())
                .with_message(format!("client action required: {}", call.name))
                .with_continuation(request),
        );
        SceneOutcome::AwaitingClient
    }

    /// Execute one server tool call. Errors and unknown tools are converted
    /// into tool-error result messages; the loop continues either way.
    async fn run_server_tool(
        &self,
        ctx: &mut SceneContext,
        scene: &Scene,
        tools: &[Arc<dyn Tool>],
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> ModelMessage {
        ctx.emit(
            SceneEvent::status(SceneStatus::FunctionRequest)
                .with_scene(scene.name())
                .with_message(call.name.clone()),
        );

        let Some(tool) = tools.iter().find(|t| t.name() == call.name) else {
            tracing::warn!(scene = %scene.name(), tool = %call.name, "model called unknown tool");
            ctx.emit(
                SceneEvent::status(SceneStatus::FunctionCompleted)
                    .with_scene(scene.name())
                    .with_message(format!("tool '{}' not found", call.name)),
            );
            return ModelMessage::tool_result(
                call.id.clone(),
                serde_json::json!({ "error": format!("Tool '{}' not found", call.name) }),
                true,
            );
        };

        let args = ToolArguments::new(call.arguments.clone());
        let exec_ctx = ToolExecutionContext {
            metadata: serde_json::Value::Null,
            tool_call_id: Some(call.id.clone()),
            tool_name: Some(call.name.clone()),
            cancel: cancel.clone(),
        };
        match tool.execute(&args, &exec_ctx).await {
            Ok(value) => {
                ctx.record_tool_call(scene.name(), call);
                ctx.emit(
                    SceneEvent::status(SceneStatus::FunctionCompleted)
                        .with_scene(scene.name())
                        .with_message(call.name.clone()),
                );
                tool_result_message(&call.id, value, false)
            }
            Err(err) => {
                tracing::warn!(scene = %scene.name(), tool = %call.name, error = %err, "tool execution failed");
                ctx.emit(
                    SceneEvent::status(SceneStatus::FunctionCompleted)
                        .with_scene(scene.name())
                        .with_message(format!("{} failed: {err}", call.name)),
                );
                ModelMessage::tool_result(
                    call.id.clone(),
                    serde_json::json!({ "error": err.to_string() }),
                    true,
                )
            }
        }
    }
}

/// Re-derive the message history from context: system context, prior turns
/// from the replayed log, then this request's input.
pub(crate) fn base_messages(ctx: &SceneContext, system_context: &str) -> Vec<ModelMessage> {
    let mut messages = Vec::new();
    if !system_context.is_empty() {
        messages.push(ModelMessage::system(system_context));
    }
    for event in &ctx.history {
        match event.status {
            SceneStatus::Initializing => {
                if let Some(text) = event.message.as_deref().filter(|t| !t.is_empty()) {
                    messages.push(ModelMessage::user(text));
                }
            }
            SceneStatus::Running => {
                if let Some(text) = event.message.as_deref().filter(|t| !t.is_empty()) {
                    messages.push(ModelMessage::assistant(text));
                }
            }
            _ => {}
        }
    }
    if !ctx.input.is_empty() {
        messages.push(ModelMessage::user(&ctx.input));
    }
    messages
}

/// Interpret a tool's return value as multi-modal content items if it has
/// that shape.
fn content_items(value: &serde_json::Value) -> Option<Vec<ContentPart>> {
    fn item(value: &serde_json::Value) -> Option<ContentPart> {
        let object = value.as_object()?;
        match object.get("type")?.as_str()? {
            "text" => Some(ContentPart::Text {
                text: object.get("text")?.as_str()?.to_string(),
            }),
            "image" => Some(ContentPart::Image(ImageContent {
                data: object.get("data")?.as_str()?.to_string(),
                mime_type: object.get("mime_type")?.as_str()?.to_string(),
            })),
            _ => None,
        }
    }
    match value {
        serde_json::Value::Array(values) => {
            let items: Vec<ContentPart> = values.iter().map(item).collect::<Option<_>>()?;
            (!items.is_empty()).then_some(items)
        }
        other => item(other).map(|part| vec![part]),
    }
}

/// Build the function-result message fed back into history: a plain value,
/// or a multi-part message when the tool returned content items.
fn tool_result_message(call_id: &str, value: serde_json::Value, is_error: bool) -> ModelMessage {
    let Some(items) = content_items(&value) else {
        return ModelMessage::tool_result(call_id, value, is_error);
    };
    let text = items
        .iter()
        .filter_map(|part| match part {
            ContentPart::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n");
    let mut content = vec![ContentPart::ToolResult(crate::types::ToolCallResult {
        tool_call_id: call_id.to_string(),
        result: serde_json::Value::String(text),
        is_error,
    })];
    content.extend(
        items
            .into_iter()
            .filter(|part| matches!(part, ContentPart::Image(_))),
    );
    ModelMessage {
        role: Role::Tool,
        content,
        timestamp: Some(Utc::now()),
    }
}
