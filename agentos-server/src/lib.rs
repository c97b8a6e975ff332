//! HTTP surface of AgentOS.
//!
//! Every `/v1/*` request passes the same ordered gates: per-IP pre-auth
//! token bucket, bearer authentication, scope check, per-(tenant, endpoint)
//! rate limit, and only then the handler, which applies quotas,
//! idempotency, and input validation before reaching the engine. A single
//! error type renders the `{"error":{"code","message"}}` envelope.

pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod ratelimit;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use routes::app;
pub use state::AppState;
