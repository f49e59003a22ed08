pub mod metrics;
pub mod tracing;

pub use metrics::metrics_middleware;
pub use tracing::{RequestId, request_id_middleware};
