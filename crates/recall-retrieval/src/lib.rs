//! Passage chunking and hybrid retrieval for previously seen documents.
//!
//! Splits documents into quality-scored passages, ranks them for a query by
//! fusing TF-IDF keyword scores with embedding similarity, and assembles a
//! bounded, source-diverse passage set for answer generation.
//!
//! # Main types
//!
//! - [`PassageChunker`]: Splits a document into ordered, scored passages.
//! - [`LexicalScorer`]: Field-weighted TF-IDF keyword scoring.
//! - [`HybridSearcher`]: Weighted RRF over semantic and keyword rankings.
//! - [`DiversityRetriever`]: Capped, quality-aware passage selection.
//! - [`CorpusStore`]: Trait for document snapshot providers.
//! - [`EmbeddingProvider`]: Trait for unit-normalized text embeddings.
//! - [`RecallEngine`]: Validated request/response front door.

/// Read-through LRU cache for search results.
pub mod cache;
/// Document-to-passage chunking.
pub mod chunker;
/// Engine configuration.
pub mod config;
/// Context rendering for answer generation.
pub mod context;
/// Diversity-constrained passage retrieval.
pub mod diversity;
/// Embedding provider trait and local implementation.
pub mod embedding;
/// Reciprocal Rank Fusion and confidence bands.
pub mod fusion;
/// Hybrid search combining embeddings and TF-IDF.
pub mod hybrid;
/// TF-IDF keyword scoring.
pub mod lexical;
/// Engine request/response protocol.
pub mod protocol;
/// Corpus store trait and file-backed implementation.
pub mod store;
/// Brute-force vector scoring.
pub mod vector;

pub use cache::{CacheStats, ResultCache};
pub use chunker::{quality_score, PassageChunker};
pub use config::{
    CacheConfig, ChunkerConfig, ConfidenceThresholds, DiversityConfig, FusionConfig,
    LexicalConfig, RecallConfig,
};
pub use context::render_context;
pub use diversity::{group_by_document, select_diverse, DiversityRetriever, RetrievedPassage, SourceGroup};
pub use embedding::{embed_passages, similarity, EmbeddingProvider, EmbeddingRole, LocalEmbedding};
pub use fusion::{fuse, normalize_weights, Confidence, FusedEntry, RankedResult, SearchMode};
pub use hybrid::HybridSearcher;
pub use lexical::{LexicalHit, LexicalScorer};
pub use protocol::{EngineRequest, EngineResponse, RecallEngine};
pub use store::{CorpusStore, FileCorpusStore, InMemoryCorpusStore};
pub use vector::{rank_documents, score_passages, VectorHit};
