use std::collections::HashMap;

use super::{CatalogError, ToolsetRegistry};

/// Reverse index from tool name to owning toolset.
///
/// Built once at startup and read without locking afterwards.
#[derive(Debug, Clone, Default)]
pub struct ToolGroupIndex {
    groups: HashMap<String, String>,
}

impl ToolGroupIndex {
    pub fn from_registry(registry: &ToolsetRegistry) -> Result<Self, CatalogError> {
        Self::from_entries(registry.memberships())
    }

    /// Build from `(tool, toolset)` pairs. A tool listed twice is an error.
    pub fn from_entries<I, T, S>(entries: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = (T, S)>,
        T: Into<String>,
        S: Into<String>,
    {
        let mut groups: HashMap<String, String> = HashMap::new();

        for (tool, toolset) in entries {
            let tool: String = tool.into();
            let toolset: String = toolset.into();
            if let Some(first) = groups.get(&tool) {
                return Err(CatalogError::DuplicateTool {
                    first: first.clone(),
                    second: toolset,
                    tool,
                });
            }
            groups.insert(tool, toolset);
        }

        Ok(Self { groups })
    }

    /// Toolset owning `tool_name`. Unregistered names have no group.
    pub fn group_of(&self, tool_name: &str) -> Option<&str> {
        self.groups.get(tool_name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}
