//! Core vocabulary of the AgentOS memory store.
//!
//! This crate holds everything the other crates agree on: typed identifiers,
//! the error taxonomy that maps to the wire envelope, POSIX-like path
//! normalization and glob translation, and canonical JSON hashing. It has no
//! I/O and no async; storage and transport live in the sibling crates.

pub mod canonical;
pub mod error;
pub mod path;
pub mod types;

pub use canonical::{canonical_json, content_hash, sha256_hex, TOMBSTONE_CONTENT_HASH};
pub use error::ApiError;
pub use types::{AgentName, KeyId, Scope, TenantId, VersionId};

pub type Result<T> = std::result::Result<T, ApiError>;
