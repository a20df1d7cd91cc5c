//! Convenience re-exports for common use.

pub use crate::chat::{ChatClient, ChatReply, ChatRequest, ChatStreamDelta, ToolDefinition};
pub use crate::error::{Result, TroupeError};
pub use crate::manager::{SceneManager, SceneRequest};
pub use crate::mcp::McpConnector;
pub use crate::modes::{ExecutionPlan, PlanStep, Planner, PlannerVerdict};
pub use crate::scene::{Actor, ClientToolDefinition, Scene, SceneRegistry};
pub use crate::scene_loop::{SceneContext, SceneEvent, SceneEventStream, SceneStatus};
pub use crate::services::{
    InMemoryCache, InMemoryMemoryStore, RateLimiter, ResponseCache, WindowRateLimiter,
};
pub use crate::tools::{SceneTool, Tool, ToolArguments, ToolParameters};
pub use crate::types::{
    CacheBehavior, ClientInteractionResult, ExecuteSettings, ExecutionMode, ModelMessage,
    ResultContent, Usage,
};
