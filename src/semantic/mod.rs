//! Semantic contact lookup.
//!
//! Nothing here computes similarity locally. Embeddings come from an
//! OpenAI-compatible embeddings API and nearest-neighbour retrieval is done
//! by a hosted vector index, both over plain HTTP.
//!
//! # Architecture
//!
//! - `embeddings`: embeddings API client
//! - `index`: vector index data-plane client (upsert/query/delete)
//! - `preprocess`: contact -> document text and vector ids
//! - `service`: lazily-initialised service used by the app layer

pub mod embeddings;
pub mod index;
mod preprocess;
mod service;

pub use embeddings::{EmbeddingError, Embedder, HttpEmbedder};
pub use index::{HttpVectorIndex, IndexError, IndexMatch, VectorIndexClient, VectorRecord};
pub use service::{SemanticMatch, SemanticSearchError, SemanticSearchService};

/// Contacts embedded per request during a full reindex
pub const EMBED_BATCH_SIZE: usize = 64;
