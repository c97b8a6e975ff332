//! Bearer-key authentication for AgentOS.
//!
//! Credentials are presented as `Authorization: Bearer <id>.<secret>`. The
//! secret is verified against a stored argon2 hash; successful tokens are
//! cached for 60 seconds so hot clients skip both the database and the hash.
//! Repeated failures for one key id trip a 15-minute lockout before any
//! database work happens.

mod authenticator;
mod bearer;
mod bootstrap;
mod cache;
mod lockout;

pub use authenticator::{AuthContext, Authenticator};
pub use bearer::parse_bearer;
pub use bootstrap::{create_api_key, hash_secret, NewApiKey};
pub use cache::AuthCache;
pub use lockout::FailureTracker;
