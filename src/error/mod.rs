//! Error types for Troupe.

use std::time::Duration;

use thiserror::Error;

/// Primary error type for all Troupe operations.
#[derive(Error, Debug)]
pub enum TroupeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Chat client error: {0}")]
    ChatClient(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Unknown scene: {0}")]
    UnknownScene(String),

    #[error("Rate limited: retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Budget exceeded: total cost {total_cost} over budget {budget}")]
    BudgetExceeded { budget: f64, total_cost: f64 },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Cancelled")]
    Cancelled,
}

impl TroupeError {
    /// Create a tool execution error.
    pub fn tool(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }

    /// The retry-after hint carried by a rate-limit rejection, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    /// Whether this error ends the whole request rather than a single scene.
    pub fn is_request_fatal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::RateLimited { .. }
                | Self::BudgetExceeded { .. }
                | Self::Cancelled
        )
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, TroupeError>;
