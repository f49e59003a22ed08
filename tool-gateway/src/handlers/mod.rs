pub mod health;
pub mod mcp;

pub use health::{health_check, metrics_endpoint, readiness_check};
pub use mcp::handle_mcp;
