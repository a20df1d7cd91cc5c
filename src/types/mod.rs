//! Shared data types: messages, usage accounting, execution settings.

pub mod message;
pub mod settings;
pub mod usage;

pub use message::{ContentPart, ImageContent, ModelMessage, Role, ToolCall, ToolCallResult};
pub use settings::{
    CacheBehavior, ClientInteractionResult, ExecuteSettings, ExecutionMode, ResultContent,
};
pub use usage::Usage;
