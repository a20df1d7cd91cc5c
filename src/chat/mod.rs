//! The chat-client seam: the engine's only view of the model backend.
//!
//! Retry, fallback, and load balancing among named backends are entirely
//! internal to implementations of [`ChatClient`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::types::{ModelMessage, ToolCall, Usage};

/// A tool definition advertised to the model.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema object describing the parameters.
    pub parameters: serde_json::Value,
}

/// One model call.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ModelMessage>,
    pub tools: Vec<ToolDefinition>,
    /// Force the model to call the named tool.
    pub require_tool: Option<String>,
}

/// The completed reply to one model call.
#[derive(Debug, Clone)]
pub struct ChatReply {
    pub message: ModelMessage,
    pub usage: Usage,
    /// Monetary cost of this call, in the client's currency.
    pub cost: f64,
}

/// One chunk of a streamed model reply.
#[derive(Debug, Clone, Default)]
pub struct ChatStreamDelta {
    pub text: Option<String>,
    pub tool_call: Option<ToolCall>,
    pub usage: Option<Usage>,
    pub cost: Option<f64>,
}

/// Stream of reply chunks.
pub type ChatStream = BoxStream<'static, Result<ChatStreamDelta>>;

/// Model-calling collaborator.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Perform one blocking model call.
    async fn get_response(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatReply>;

    /// Perform one streaming model call.
    ///
    /// The default implementation degrades to a single-chunk stream built
    /// from [`ChatClient::get_response`].
    async fn stream_response(
        &self,
        request: &ChatRequest,
        cancel: &CancellationToken,
    ) -> Result<ChatStream> {
        let reply = self.get_response(request, cancel).await?;
        let mut deltas = Vec::new();
        let text = reply.message.text();
        if !text.is_empty() {
            deltas.push(Ok(ChatStreamDelta {
                text: Some(text),
                ..Default::default()
            }));
        }
        for call in reply.message.tool_calls() {
            deltas.push(Ok(ChatStreamDelta {
                tool_call: Some(call.clone()),
                ..Default::default()
            }));
        }
        deltas.push(Ok(ChatStreamDelta {
            usage: Some(reply.usage),
            cost: Some(reply.cost),
            ..Default::default()
        }));
        Ok(Box::pin(futures::stream::iter(deltas)))
    }

    /// Currency the cost figures are denominated in.
    fn currency(&self) -> &str {
        "USD"
    }
}
