//! Embedding pipeline: the provider abstraction, the text contract, and the
//! claim-and-process worker that drains the job queue.
//!
//! Providers are never trusted with error content: an upstream failure is
//! reduced to its HTTP status before it reaches logs, job rows, or clients.

pub mod embedder;
pub mod text;
pub mod worker;

pub use embedder::{EmbedError, Embedder, MockEmbedder, OpenAiEmbedder, EMBEDDING_DIMENSION};
pub use worker::{EmbedWorker, WorkerConfig};
