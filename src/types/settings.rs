//! Per-request execution settings and related enums.

use bon::Builder;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Strategy used to select and sequence scenes for one request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExecutionMode {
    /// The model picks at most one scene through zero-argument select tools.
    Direct,
    /// Run the caller-named scene directly, bypassing selection.
    Scene,
    /// A planner produces an ordered multi-step execution plan.
    Planning,
    /// The model picks the next scene round by round until it decides to stop.
    DynamicChaining,
}

/// Cache policy for one request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CacheBehavior {
    #[default]
    Normal,
    /// One-shot request: skip cache load and persistence.
    Avoidable,
}

/// A single content item supplied by the caller as a client-side tool result.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultContent {
    Text { text: String },
    Image { data: String, mime_type: String },
}

/// A completed client-side tool interaction handed back on resumption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientInteractionResult {
    /// Correlation key; equals the client tool's name.
    pub interaction_id: String,
    pub contents: Vec<ResultContent>,
}

impl ClientInteractionResult {
    /// Collapse the contents into a tool-result JSON value.
    pub(crate) fn to_value(&self) -> serde_json::Value {
        match self.contents.as_slice() {
            [ResultContent::Text { text }] => serde_json::Value::String(text.clone()),
            contents => serde_json::to_value(contents).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Settings controlling one `execute` call.
///
/// Everything is optional; unset fields fall back to the manager's defaults.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, Default)]
pub struct ExecuteSettings {
    pub conversation_key: Option<String>,
    pub cache_behavior: Option<CacheBehavior>,
    pub mode: Option<ExecutionMode>,
    /// Scene to run; required for `ExecutionMode::Scene`.
    pub scene_name: Option<String>,
    pub streaming: Option<bool>,
    /// Ceiling on cumulative monetary cost for this request.
    pub max_budget: Option<f64>,
    /// Bound on the number of plan steps executed in Planning mode.
    pub max_recursion_depth: Option<usize>,
    /// Bound on the number of scenes executed in DynamicChaining mode.
    pub max_dynamic_scenes: Option<usize>,
    /// Client-side tool results; present only when resuming a paused request.
    pub client_results: Option<Vec<ClientInteractionResult>>,
}

/// Settings after merging a request's overrides with the manager defaults.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedSettings {
    pub conversation_key: String,
    pub cache_behavior: CacheBehavior,
    pub mode: ExecutionMode,
    pub scene_name: Option<String>,
    pub streaming: bool,
    pub max_budget: Option<f64>,
    pub max_recursion_depth: usize,
    pub max_dynamic_scenes: usize,
    pub client_results: Vec<ClientInteractionResult>,
}
