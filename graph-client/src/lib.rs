pub mod api;
pub mod metrics;
pub mod mock;
pub mod rate_limiter;

#[cfg(test)]
mod tests;

pub use api::{classify_graph_error, parse_graph_time, GraphApiClient};
pub use metrics::{ApiMetrics, MetricsCollector, OperationMetrics, RequestMetrics};
pub use mock::{GatewayCall, MockGraphGateway};
pub use rate_limiter::{RateLimitConfig, RateLimitStatus, RateLimiter};
