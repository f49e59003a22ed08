//! Wire types for the MCP endpoint.

pub mod jsonrpc;
pub mod mcp;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, RequestParseError};
pub use mcp::{CallToolResult, Content, ToolDescriptor};
