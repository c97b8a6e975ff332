//! The AgentOS memory engine.
//!
//! Everything behind the HTTP surface lives here: the versioned path store
//! with tombstones and TTL hiding, daily quotas, the persisted idempotency
//! protocol, the dump cache, and the vector search path. The engine owns no
//! locks over persisted data; per-path serialization is the database's job.

pub mod dump_cache;
pub mod idempotency;
pub mod memory;
pub mod quota;
mod search;

pub use idempotency::{IdempotencyService, IDEMPOTENCY_SWEEP_INTERVAL};
pub use memory::{
    AgentInfo, DumpEntry, DumpOutcome, EntryKind, GetOutcome, HistoryEntry, ListItem,
    MemoryEngine, PutRequest, WriteReceipt,
};
pub use quota::{QuotaLimits, QuotaService};
pub use search::{SearchHit, SearchOutcome, SearchRequest};
