//! The event record emitted to callers.

use std::pin::Pin;
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::types::Usage;

/// Status tag on one [`SceneEvent`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SceneStatus {
    Initializing,
    ExecutingMainActors,
    Planning,
    ExecutingScene,
    /// A scene (or the request) produced answer text.
    Running,
    /// Transient streamed chunk; delivered to the caller, never persisted.
    Streaming,
    FunctionRequest,
    FunctionCompleted,
    /// A plan step was reported and skipped without aborting the plan.
    StepSkipped,
    /// A client-side tool must run; the request is paused.
    AwaitingClient,
    GeneratingFinalResponse,
    BudgetExceeded,
    Error,
    Completed,
}

impl SceneStatus {
    /// Whether this status ends the request.
    ///
    /// `Error` is terminal for Direct and Scene runs; inside a multi-step
    /// flow a scene-level `Error` may be followed by further steps, so
    /// consumers that must drain generically should read until the stream
    /// closes.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::AwaitingClient | Self::BudgetExceeded | Self::Error | Self::Completed
        )
    }
}

/// The request the caller must execute client-side before resuming.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientToolRequest {
    /// Correlation key; equals the client tool's name.
    pub interaction_id: String,
    /// Original model tool-call id, used to correlate the result on resume.
    pub call_id: String,
    pub call_name: String,
    pub arguments: serde_json::Value,
}

/// One immutable progress/result record.
///
/// `total_cost` is always the cumulative figure at emission time, never a
/// delta.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneEvent {
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub status: SceneStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    pub total_cost: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<ClientToolRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_key: Option<String>,
}

impl SceneEvent {
    /// Start building an event; the context stamps seq, timestamp, cost and
    /// conversation key at emission.
    pub fn status(status: SceneStatus) -> Self {
        Self {
            seq: 0,
            timestamp: Utc::now(),
            status,
            scene: None,
            message: None,
            usage: None,
            total_cost: 0.0,
            currency: String::new(),
            continuation: None,
            conversation_key: None,
        }
    }

    pub fn with_scene(mut self, scene: impl Into<String>) -> Self {
        self.scene = Some(scene.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn with_continuation(mut self, continuation: ClientToolRequest) -> Self {
        self.continuation = Some(continuation);
        self
    }
}

/// Ordered, unidirectional stream of events for one `execute` call.
///
/// The producer side closes when the request finishes (or is cancelled), so
/// draining to stream end is always safe.
pub struct SceneEventStream {
    inner: UnboundedReceiverStream<SceneEvent>,
}

impl SceneEventStream {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<SceneEvent>) -> Self {
        Self {
            inner: UnboundedReceiverStream::new(rx),
        }
    }

    /// Collect every event until the stream closes.
    pub async fn drain(self) -> Vec<SceneEvent> {
        use futures::StreamExt;
        self.collect().await
    }
}

impl Stream for SceneEventStream {
    type Item = SceneEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
