//! Scenes: named, independently configured bounded units of capability.

pub mod actor;
pub mod registry;

use std::sync::Arc;
use std::time::Duration;

pub use actor::{Actor, ActorInput};
pub use registry::{normalize_scene_name, SceneRegistry};

use crate::tools::{Tool, ToolParameters};

/// A tool that must execute on the caller's side; the engine pauses the
/// request when the model calls it and resumes on a later `execute` call.
#[derive(Debug, Clone)]
pub struct ClientToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

/// Static configuration for one scene. Built once at startup; immutable at
/// run time.
#[derive(Clone)]
pub struct Scene {
    name: String,
    description: String,
    tools: Vec<Arc<dyn Tool>>,
    actors: Vec<Actor>,
    mcp_references: Vec<String>,
    client_tools: Vec<ClientToolDefinition>,
    cache_required: bool,
    cache_expiration: Option<Duration>,
}

impl Scene {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: Vec::new(),
            actors: Vec::new(),
            mcp_references: Vec::new(),
            client_tools: Vec::new(),
            cache_required: false,
            cache_expiration: None,
        }
    }

    /// Add a server-side tool.
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Add an already-shared server-side tool.
    pub fn with_tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Add a pre-loop context-injecting actor.
    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actors.push(actor);
        self
    }

    /// Reference an MCP tool namespace to pull tools from.
    pub fn with_mcp_reference(mut self, reference: impl Into<String>) -> Self {
        self.mcp_references.push(reference.into());
        self
    }

    /// Add a client-side tool definition.
    pub fn with_client_tool(mut self, tool: ClientToolDefinition) -> Self {
        self.client_tools.push(tool);
        self
    }

    /// Force cache persistence even when the request asked to avoid it.
    pub fn with_cache_required(mut self, required: bool) -> Self {
        self.cache_required = required;
        self
    }

    /// TTL for cache entries produced by requests that executed this scene.
    pub fn with_cache_expiration(mut self, expiration: Duration) -> Self {
        self.cache_expiration = Some(expiration);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Scene name with every non-alphanumeric run replaced by `_`, usable as
    /// a model-facing tool name.
    pub fn tool_safe_name(&self) -> String {
        self.name
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn tools(&self) -> &[Arc<dyn Tool>] {
        &self.tools
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn mcp_references(&self) -> &[String] {
        &self.mcp_references
    }

    pub fn client_tools(&self) -> &[ClientToolDefinition] {
        &self.client_tools
    }

    /// Look up a client tool by the name the model called.
    pub fn client_tool(&self, name: &str) -> Option<&ClientToolDefinition> {
        self.client_tools.iter().find(|t| t.name == name)
    }

    pub fn cache_required(&self) -> bool {
        self.cache_required
    }

    pub fn cache_expiration(&self) -> Option<Duration> {
        self.cache_expiration
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("name", &self.name)
            .field("tools", &self.tools.len())
            .field("actors", &self.actors.len())
            .field("mcp_references", &self.mcp_references)
            .field("client_tools", &self.client_tools.len())
            .finish()
    }
}
