//! Registered tools, grouped into toolsets.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{AuthMaterial, Scope};
use crate::protocol::{CallToolResult, ToolDescriptor};

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("platform request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("no caller credential available to forward")]
    MissingCredential,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("tool '{tool}' registered in both '{first}' and '{second}'")]
    DuplicateTool {
        tool: String,
        first: String,
        second: String,
    },

    #[error("toolset '{0}' registered twice")]
    DuplicateToolset(String),
}

/// Per-call context handed to tool handlers.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub scope: Scope,
    pub credential: Option<AuthMaterial>,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &ToolContext, arguments: Value) -> Result<CallToolResult, ToolError>;
}

#[derive(Clone)]
pub struct Tool {
    pub descriptor: ToolDescriptor,
    pub handler: Arc<dyn ToolHandler>,
}

impl Tool {
    pub fn new(descriptor: ToolDescriptor, handler: Arc<dyn ToolHandler>) -> Self {
        Self {
            descriptor,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }
}

#[derive(Clone)]
pub struct Toolset {
    pub name: String,
    pub description: String,
    pub tools: Vec<Tool>,
}

impl Toolset {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }
}

/// Every tool the gateway can serve, in registration order.
///
/// Tool names are unique across the whole registry.
#[derive(Clone, Default)]
pub struct ToolsetRegistry {
    toolsets: Vec<Toolset>,
}

impl ToolsetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, toolset: Toolset) -> Result<(), CatalogError> {
        if self.toolsets.iter().any(|t| t.name == toolset.name) {
            return Err(CatalogError::DuplicateToolset(toolset.name));
        }

        let mut incoming = HashSet::new();
        for tool in &toolset.tools {
            let existing = self
                .toolset_of(tool.name())
                .map(str::to_string)
                .or_else(|| (!incoming.insert(tool.name())).then(|| toolset.name.clone()));

            if let Some(first) = existing {
                return Err(CatalogError::DuplicateTool {
                    tool: tool.name().to_string(),
                    first,
                    second: toolset.name.clone(),
                });
            }
        }

        tracing::debug!(
            toolset = %toolset.name,
            tools = toolset.tools.len(),
            "Registered toolset"
        );
        self.toolsets.push(toolset);
        Ok(())
    }

    pub fn toolsets(&self) -> &[Toolset] {
        &self.toolsets
    }

    pub fn tool_count(&self) -> usize {
        self.toolsets.iter().map(|t| t.tools.len()).sum()
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.tools().map(|tool| tool.descriptor.clone()).collect()
    }

    pub fn find(&self, tool_name: &str) -> Option<&Tool> {
        self.tools().find(|tool| tool.name() == tool_name)
    }

    /// `(tool, toolset)` for every registered tool.
    pub fn memberships(&self) -> impl Iterator<Item = (&str, &str)> {
        self.toolsets.iter().flat_map(|toolset| {
            toolset
                .tools
                .iter()
                .map(move |tool| (tool.name(), toolset.name.as_str()))
        })
    }

    fn tools(&self) -> impl Iterator<Item = &Tool> {
        self.toolsets.iter().flat_map(|toolset| toolset.tools.iter())
    }

    fn toolset_of(&self, tool_name: &str) -> Option<&str> {
        self.memberships()
            .find(|(tool, _)| *tool == tool_name)
            .map(|(_, toolset)| toolset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, _ctx: &ToolContext, arguments: Value) -> Result<CallToolResult, ToolError> {
            Ok(CallToolResult::text(arguments.to_string()))
        }
    }

    fn tool(name: &str) -> Tool {
        Tool::new(
            ToolDescriptor::with_string_params(name, "test tool", &[]),
            Arc::new(Echo),
        )
    }

    #[test]
    fn test_register_and_find() {
        let mut registry = ToolsetRegistry::new();
        registry
            .register(Toolset::new("pipelines", "Pipelines").with_tool(tool("list_pipelines")))
            .unwrap();
        registry
            .register(Toolset::new("ci", "CI").with_tool(tool("get_build")).with_tool(tool("list_builds")))
            .unwrap();

        assert_eq!(registry.tool_count(), 3);
        assert!(registry.find("get_build").is_some());
        assert!(registry.find("missing").is_none());

        let names: Vec<_> = registry.descriptors().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["list_pipelines", "get_build", "list_builds"]);
    }

    #[test]
    fn test_duplicate_tool_across_toolsets() {
        let mut registry = ToolsetRegistry::new();
        registry
            .register(Toolset::new("pipelines", "Pipelines").with_tool(tool("shared")))
            .unwrap();

        let err = registry
            .register(Toolset::new("ci", "CI").with_tool(tool("shared")))
            .unwrap_err();
        assert_eq!(
            err,
            CatalogError::DuplicateTool {
                tool: "shared".into(),
                first: "pipelines".into(),
                second: "ci".into(),
            }
        );
    }

    #[test]
    fn test_duplicate_tool_within_toolset() {
        let mut registry = ToolsetRegistry::new();
        let err = registry
            .register(Toolset::new("ci", "CI").with_tool(tool("a")).with_tool(tool("a")))
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateTool { .. }));
        assert_eq!(registry.tool_count(), 0);
    }

    #[test]
    fn test_duplicate_toolset() {
        let mut registry = ToolsetRegistry::new();
        registry.register(Toolset::new("ci", "CI")).unwrap();
        assert_eq!(
            registry.register(Toolset::new("ci", "CI again")).unwrap_err(),
            CatalogError::DuplicateToolset("ci".into())
        );
    }
}
