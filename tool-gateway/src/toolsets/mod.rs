//! Tool registration: toolsets, handlers and the tool-to-toolset index.

pub mod catalog;
pub mod index;
pub mod registry;
pub mod rest;

pub use catalog::default_registry;
pub use index::ToolGroupIndex;
pub use registry::{CatalogError, Tool, ToolContext, ToolError, ToolHandler, Toolset, ToolsetRegistry};
pub use rest::{PlatformClient, RestTool, RestToolHandler};
