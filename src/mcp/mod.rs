//! External tool-protocol (MCP) collaborator and its bridge into the tool
//! system.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::tools::{Tool, ToolArguments, ToolExecutionContext, ToolParameters};

/// A tool advertised by an MCP server.
#[derive(Debug, Clone)]
pub struct McpToolSchema {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// The MCP collaborator: supplies additional tools and system context.
#[async_trait]
pub trait McpConnector: Send + Sync {
    /// List tools matching the scene's MCP references.
    async fn get_tools(
        &self,
        filter: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<McpToolSchema>>;

    /// Build a system-context message describing the referenced servers.
    async fn build_system_message(
        &self,
        filter: &[String],
        cancel: &CancellationToken,
    ) -> Result<String>;

    /// Execute a tool with serialized JSON arguments.
    async fn execute_tool(
        &self,
        name: &str,
        args_json: &str,
        cancel: &CancellationToken,
    ) -> Result<serde_json::Value>;
}

/// Wraps one MCP tool as a callable [`Tool`] proxying to the connector.
pub struct McpToolAdapter {
    name: String,
    description: String,
    parameters: ToolParameters,
    connector: Arc<dyn McpConnector>,
}

impl McpToolAdapter {
    pub fn new(schema: McpToolSchema, connector: Arc<dyn McpConnector>) -> Self {
        Self {
            name: schema.name,
            description: schema.description.unwrap_or_default(),
            parameters: ToolParameters::from_schema(schema.input_schema),
            connector,
        }
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &ToolParameters {
        &self.parameters
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        ctx: &ToolExecutionContext,
    ) -> Result<serde_json::Value> {
        self.connector
            .execute_tool(&self.name, &args.raw().to_string(), &ctx.cancel)
            .await
    }
}

impl std::fmt::Debug for McpToolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpToolAdapter")
            .field("name", &self.name)
            .finish()
    }
}
