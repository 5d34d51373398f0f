//! Embedding provider and content-hashed cache (spec §4.2).

mod cache;
mod provider;

pub use cache::{CachePersistence, EmbeddingCache};
pub use provider::{EmbeddingProvider, HashEmbeddingProvider};

/// Process-wide embedding dimension. Mixing models with different
/// dimensions in one collection is an error (§4.2).
pub const EMBEDDING_DIM: usize = 256;
