#![allow(dead_code)]
//! Shared test helpers: a scripted chat client and event assertions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use troupe::chat::{ChatClient, ChatReply, ChatRequest};
use troupe::error::{Result, TroupeError};
use troupe::scene_loop::{SceneEvent, SceneStatus};
use troupe::types::{ContentPart, ModelMessage, ToolCall, Usage};

/// A chat client that replays queued replies in order.
pub struct ScriptedChatClient {
    replies: Mutex<VecDeque<ChatReply>>,
    repeat_last: bool,
    calls: AtomicUsize,
    /// Every request received, for assertions on message history.
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatClient {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            repeat_last: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Keep replaying the last reply once the script runs out.
    pub fn with_repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Queue a plain text reply.
    pub fn push_text(&self, text: &str, cost: f64) {
        self.replies.lock().unwrap().push_back(ChatReply {
            message: ModelMessage::assistant(text),
            usage: usage(),
            cost,
        });
    }

    /// Queue a tool-call reply.
    pub fn push_tool_call(&self, id: &str, name: &str, arguments: serde_json::Value, cost: f64) {
        self.replies.lock().unwrap().push_back(ChatReply {
            message: ModelMessage::assistant_with(vec![ContentPart::ToolCall(ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                arguments,
            })]),
            usage: usage(),
            cost,
        });
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn usage() -> Usage {
    Usage {
        input_tokens: 10,
        output_tokens: 5,
        cached_input_tokens: None,
    }
}

#[async_trait]
impl ChatClient for ScriptedChatClient {
    async fn get_response(
        &self,
        request: &ChatRequest,
        _cancel: &CancellationToken,
    ) -> Result<ChatReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let mut replies = self.replies.lock().unwrap();
        let Some(reply) = replies.pop_front() else {
            return Err(TroupeError::ChatClient("script exhausted".into()));
        };
        if self.repeat_last && replies.is_empty() {
            replies.push_back(reply.clone());
        }
        Ok(reply)
    }
}

/// Property: `total_cost` never decreases across the event stream.
pub fn assert_cost_monotonic(events: &[SceneEvent]) {
    for pair in events.windows(2) {
        assert!(
            pair[1].total_cost >= pair[0].total_cost,
            "cost decreased: {:?} then {:?}",
            pair[0],
            pair[1]
        );
    }
}

pub fn statuses(events: &[SceneEvent]) -> Vec<SceneStatus> {
    events.iter().map(|event| event.status).collect()
}

/// Scene names of `ExecutingScene` events, in order.
pub fn executed_scenes(events: &[SceneEvent]) -> Vec<String> {
    events
        .iter()
        .filter(|event| event.status == SceneStatus::ExecutingScene)
        .filter_map(|event| event.scene.clone())
        .collect()
}
