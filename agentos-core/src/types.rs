use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use derive_more::{AsRef, Deref, Display, From, Into};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Top-level account boundary. Every persisted row carries the owning tenant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize,
    Deserialize,
)]
pub struct TenantId(Uuid);

impl TenantId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for TenantId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Public half of an API key credential.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize, Deserialize,
)]
pub struct KeyId(String);

/// Identifier of one immutable entry version.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, From, AsRef, Deref, Into, Serialize,
    Deserialize,
)]
pub struct VersionId(Uuid);

impl VersionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for VersionId {
    fn default() -> Self {
        Self::new()
    }
}

static AGENT_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,128}$").expect("agent name regex"));

/// Logical application namespace within a tenant.
///
/// Names are restricted to `[A-Za-z0-9_-]`, 1 to 128 characters, so they can
/// be used verbatim in query parameters, log fields, and cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, AsRef, Deref, Into, Serialize)]
pub struct AgentName(String);

impl AgentName {
    pub fn parse(raw: impl Into<String>) -> crate::Result<Self> {
        let raw = raw.into();
        if AGENT_NAME_RE.is_match(&raw) {
            Ok(Self(raw))
        } else {
            Err(ApiError::Validation(
                "agent_id must be 1-128 characters of [A-Za-z0-9_-]".to_string(),
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for AgentName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        AgentName::parse(raw).map_err(serde::de::Error::custom)
    }
}

/// Permission granted to an API key.
///
/// `Admin` implies every other scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    MemoryRead,
    MemoryWrite,
    SearchRead,
    Admin,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::MemoryRead => "memory:read",
            Scope::MemoryWrite => "memory:write",
            Scope::SearchRead => "search:read",
            Scope::Admin => "admin",
        }
    }

    /// Parse a stored scope string. Unknown scopes yield `None` so that a
    /// future key with extra scopes still authenticates with the ones this
    /// build understands.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "memory:read" => Some(Scope::MemoryRead),
            "memory:write" => Some(Scope::MemoryWrite),
            "search:read" => Some(Scope::SearchRead),
            "admin" => Some(Scope::Admin),
            _ => None,
        }
    }

    pub fn all() -> [Scope; 4] {
        [Scope::MemoryRead, Scope::MemoryWrite, Scope::SearchRead, Scope::Admin]
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
