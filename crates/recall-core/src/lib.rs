//! Core types and error definitions for the Recall retrieval engine.
//!
//! This crate provides the foundational types shared across all Recall crates,
//! including error handling and the document/passage data model.
//!
//! # Main types
//!
//! - [`RecallError`]: Unified error enum for all Recall subsystems.
//! - [`RecallResult`]: Convenience alias for `Result<T, RecallError>`.
//! - [`Document`]: A previously seen page together with its passages.
//! - [`Passage`]: A bounded, contiguous span of document text; the atomic retrieval unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

// --- Error types ---

/// Top-level error type for the Recall engine.
///
/// Each variant corresponds to a subsystem that can produce errors.
#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    /// The embedding provider failed (model unavailable, inference error).
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// An error from a corpus store backend.
    #[error("Store error: {0}")]
    Store(String),

    /// An error in configuration parsing or validation.
    #[error("Config error: {0}")]
    Config(String),

    /// A request rejected at the engine boundary.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// A document that cannot be persisted (e.g. it holds no passages).
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`RecallError`].
pub type RecallResult<T> = Result<T, RecallError>;

// --- Passage ---

/// A bounded, contiguous span of a document's text.
///
/// `word_count` always equals the whitespace token count of `text`, and
/// `quality` is fixed when the passage is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Unique identifier of this passage.
    pub id: Uuid,
    /// The passage text, whitespace-normalized.
    pub text: String,
    /// Number of whitespace-separated tokens in `text`.
    pub word_count: usize,
    /// Zero-based position within the owning document; strictly increasing.
    pub position: usize,
    /// Heuristic quality score in `[0, 1]`.
    pub quality: f32,
    /// Unit-normalized document-role embedding, if one has been computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Passage {
    /// Creates a passage at `position` with a precomputed quality score.
    ///
    /// The quality is clamped into `[0, 1]`.
    pub fn new(text: impl Into<String>, position: usize, quality: f32) -> Self {
        let text = text.into();
        let word_count = text.split_whitespace().count();
        Self {
            id: Uuid::new_v4(),
            text,
            word_count,
            position,
            quality: quality.clamp(0.0, 1.0),
            embedding: None,
        }
    }

    /// Attaches an embedding vector. Chainable builder method.
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Whether this passage can take part in semantic scoring.
    pub fn is_vectorized(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

// --- Document ---

/// A previously seen document, its passages and its visit statistics.
///
/// Documents are replaced wholesale on re-visit. Recency and frequency
/// fields are passed through to context consumers verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique identifier of this document.
    pub id: Uuid,
    /// Source URL.
    pub url: String,
    /// Page title.
    pub title: String,
    /// Raw page content (HTML or plain text).
    pub raw_text: String,
    /// Ordered passages; a document needs at least one to be searchable.
    #[serde(default)]
    pub passages: Vec<Passage>,
    /// How many times the page was visited.
    #[serde(default)]
    pub visit_count: u32,
    /// When the page was last visited.
    #[serde(default)]
    pub last_visited_at: Option<DateTime<Utc>>,
    /// Total time spent on the page, in seconds.
    #[serde(default)]
    pub dwell_time_secs: u64,
}

impl Document {
    /// Creates a document with no passages and no visit history.
    pub fn new(url: impl Into<String>, title: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: url.into(),
            title: title.into(),
            raw_text: raw_text.into(),
            passages: Vec::new(),
            visit_count: 0,
            last_visited_at: None,
            dwell_time_secs: 0,
        }
    }

    /// Replaces the passage list. Chainable builder method.
    pub fn with_passages(mut self, passages: Vec<Passage>) -> Self {
        self.passages = passages;
        self
    }

    /// Sets the visit statistics. Chainable builder method.
    pub fn with_visits(
        mut self,
        visit_count: u32,
        last_visited_at: Option<DateTime<Utc>>,
        dwell_time_secs: u64,
    ) -> Self {
        self.visit_count = visit_count;
        self.last_visited_at = last_visited_at;
        self.dwell_time_secs = dwell_time_secs;
        self
    }

    /// A document is searchable once it holds at least one passage.
    pub fn is_searchable(&self) -> bool {
        !self.passages.is_empty()
    }

    /// All passage texts joined in position order.
    pub fn passage_text(&self) -> String {
        self.passages
            .iter()
            .map(|p| p.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// The hostname of the document URL, lowercased, with `www.` stripped.
    ///
    /// Returns an empty string when the URL has no host.
    pub fn domain(&self) -> String {
        domain_of(&self.url)
    }
}

/// Extracts the hostname from a URL, lowercased, without `www.`, userinfo or port.
///
/// Returns an empty string when the URL does not parse or has no host.
pub fn domain_of(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_lowercase))
        .map(|host| match host.strip_prefix("www.") {
            Some(stripped) => stripped.to_string(),
            None => host,
        })
        .unwrap_or_default()
}
