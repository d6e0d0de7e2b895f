use std::sync::Arc;

use chrono::Utc;
use recall_core::{Document, Passage, RecallError, RecallResult};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunker::{page_text, quality_score, PassageChunker};
use crate::config::{DiversityConfig, RecallConfig};
use crate::context::render_context;
use crate::diversity::{group_by_document, DiversityRetriever, SourceGroup};
use crate::embedding::{embed_passages, EmbeddingProvider};
use crate::fusion::{RankedResult, SearchMode};
use crate::hybrid::HybridSearcher;
use crate::store::CorpusStore;

/// Longest accepted query, in characters.
pub const MAX_QUERY_CHARS: usize = 1_000;

/// Largest accepted result count.
pub const MAX_RESULTS: usize = 100;

/// A request to the retrieval engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineRequest {
    /// Ranked document search.
    Search {
        query: String,
        #[serde(default)]
        mode: Option<SearchMode>,
        #[serde(default)]
        k: Option<usize>,
    },

    /// Diversity-constrained context retrieval. Unset options use the
    /// configured defaults.
    Retrieve {
        query: String,
        #[serde(default)]
        top_k: Option<usize>,
        #[serde(default)]
        min_similarity: Option<f32>,
        #[serde(default)]
        max_per_document: Option<usize>,
        #[serde(default)]
        max_per_domain: Option<usize>,
        #[serde(default)]
        quality_weight: Option<f32>,
    },

    /// Chunk raw content without storing it.
    Chunk {
        content: String,
    },
}

/// A response from the retrieval engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineResponse {
    /// Ranked search results.
    Results {
        results: Vec<RankedResult>,
    },

    /// Grouped context sources and their rendered text.
    Sources {
        sources: Vec<SourceGroup>,
        context: String,
    },

    /// Passages produced by the chunker.
    Passages {
        passages: Vec<Passage>,
    },

    /// The request was rejected or failed.
    Error {
        message: String,
    },
}

/// Validated front door over the searcher, retriever and chunker.
pub struct RecallEngine {
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    searcher: HybridSearcher,
    retriever: DiversityRetriever,
    chunker: PassageChunker,
    config: RecallConfig,
}

impl RecallEngine {
    /// Wire the engine components over shared collaborators.
    pub fn new(
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: RecallConfig,
    ) -> Self {
        Self {
            searcher: HybridSearcher::new(Arc::clone(&store), Arc::clone(&embedder), &config),
            retriever: DiversityRetriever::new(
                Arc::clone(&store),
                Arc::clone(&embedder),
                config.diversity.clone(),
            ),
            chunker: PassageChunker::new(config.chunker.clone()),
            store,
            embedder,
            config,
        }
    }

    /// The hybrid searcher.
    pub fn searcher(&self) -> &HybridSearcher {
        &self.searcher
    }

    /// The diversity retriever.
    pub fn retriever(&self) -> &DiversityRetriever {
        &self.retriever
    }

    /// The passage chunker.
    pub fn chunker(&self) -> &PassageChunker {
        &self.chunker
    }

    /// Handle a request, folding failures into [`EngineResponse::Error`].
    pub async fn handle(&self, request: EngineRequest) -> EngineResponse {
        match self.try_handle(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Engine request failed");
                EngineResponse::Error {
                    message: e.to_string(),
                }
            }
        }
    }

    /// Validate and dispatch a request.
    pub async fn try_handle(&self, request: EngineRequest) -> RecallResult<EngineResponse> {
        match request {
            EngineRequest::Search { query, mode, k } => {
                validate_query(&query)?;
                let k = validate_count("k", k.unwrap_or(self.config.fusion.default_top_k))?;
                let mode = mode.unwrap_or(self.config.fusion.default_mode);
                let results = self.searcher.search(&query, mode, k).await?;
                Ok(EngineResponse::Results { results })
            }
            EngineRequest::Retrieve {
                query,
                top_k,
                min_similarity,
                max_per_document,
                max_per_domain,
                quality_weight,
            } => {
                validate_query(&query)?;
                let defaults = &self.config.diversity;
                let options = DiversityConfig {
                    top_k: validate_count("top_k", top_k.unwrap_or(defaults.top_k))?,
                    min_similarity: min_similarity.unwrap_or(defaults.min_similarity),
                    max_per_document: validate_count(
                        "max_per_document",
                        max_per_document.unwrap_or(defaults.max_per_document),
                    )?,
                    max_per_domain: validate_count(
                        "max_per_domain",
                        max_per_domain.unwrap_or(defaults.max_per_domain),
                    )?,
                    quality_weight: quality_weight.unwrap_or(defaults.quality_weight),
                };
                if !(-1.0..=1.0).contains(&options.min_similarity) {
                    return Err(RecallError::InvalidRequest(
                        "min_similarity must be in [-1, 1]".to_string(),
                    ));
                }
                if !(0.0..=1.0).contains(&options.quality_weight) {
                    return Err(RecallError::InvalidRequest(
                        "quality_weight must be in [0, 1]".to_string(),
                    ));
                }

                let passages = self.retriever.retrieve(&query, &options).await?;
                let sources = group_by_document(&passages);
                let context = render_context(&sources, Utc::now());
                Ok(EngineResponse::Sources { sources, context })
            }
            EngineRequest::Chunk { content } => Ok(EngineResponse::Passages {
                passages: self.chunker.chunk_text(&content),
            }),
        }
    }

    /// Chunk, embed and store a visited page.
    ///
    /// A page already stored under the same URL is replaced wholesale; its
    /// visit count and dwell time carry over and grow by this visit. When
    /// the chunker finds no block large enough, the page's visible text is
    /// kept as a single passage.
    pub async fn record_visit(
        &self,
        url: &str,
        title: &str,
        raw_text: &str,
        dwell_time_secs: u64,
    ) -> RecallResult<Document> {
        let corpus = self.store.all_documents().await?;
        let previous = corpus.iter().find(|d| d.url == url);

        let mut document = Document::new(url, title, raw_text);
        if let Some(prev) = previous {
            document.id = prev.id;
            document.visit_count = prev.visit_count;
            document.dwell_time_secs = prev.dwell_time_secs;
        }
        document.visit_count = document.visit_count.saturating_add(1);
        document.dwell_time_secs = document.dwell_time_secs.saturating_add(dwell_time_secs);
        document.last_visited_at = Some(Utc::now());

        let mut passages = self.chunker.chunk(&document);
        if passages.is_empty() {
            passages = self.fallback_passage(raw_text).into_iter().collect();
        }
        embed_passages(self.embedder.as_ref(), &mut passages).await?;
        document.passages = passages;

        let replaced = self.store.upsert(document.clone()).await?;
        self.searcher.invalidate_cache();
        info!(
            url,
            passages = document.passages.len(),
            visits = document.visit_count,
            replaced,
            "Document recorded"
        );
        Ok(document)
    }

    fn fallback_passage(&self, raw_text: &str) -> Option<Passage> {
        let text = page_text(raw_text);
        let words: Vec<&str> = text
            .split_whitespace()
            .take(self.config.chunker.max_words_per_passage)
            .collect();
        if words.is_empty() {
            return None;
        }
        let text = words.join(" ");
        let quality = quality_score(&text);
        Some(Passage::new(text, 0, quality))
    }
}

fn validate_query(query: &str) -> RecallResult<()> {
    if query.trim().is_empty() {
        return Err(RecallError::InvalidRequest("query must not be empty".to_string()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(RecallError::InvalidRequest(format!(
            "query exceeds {MAX_QUERY_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_count(name: &str, value: usize) -> RecallResult<usize> {
    if !(1..=MAX_RESULTS).contains(&value) {
        return Err(RecallError::InvalidRequest(format!(
            "{name} must be between 1 and {MAX_RESULTS}, got {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::embedding::LocalEmbedding;
    use crate::store::InMemoryCorpusStore;

    fn engine() -> RecallEngine {
        RecallEngine::new(
            Arc::new(InMemoryCorpusStore::new()),
            Arc::new(LocalEmbedding::new(128)),
            RecallConfig::default(),
        )
    }

    const PAGE: &str = "<html><body><article><p>Tokio is an asynchronous runtime for Rust. \
        It provides the building blocks needed for writing network applications. \
        However, it also gives flexibility to target a wide range of systems.</p>\
        <p>The scheduler runs tasks cooperatively, so long computations should yield \
        or move to a blocking thread pool instead of stalling the reactor.</p></article></body></html>";

    #[test]
    fn test_request_wire_format() {
        let json = r#"{"type":"search","query":"tokio runtime","mode":"keyword"}"#;
        let req: EngineRequest = serde_json::from_str(json).unwrap();
        assert_eq!(
            req,
            EngineRequest::Search {
                query: "tokio runtime".to_string(),
                mode: Some(SearchMode::Keyword),
                k: None,
            }
        );

        let resp = EngineResponse::Error {
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }

    #[tokio::test]
    async fn test_rejects_invalid_requests() {
        let engine = engine();
        for request in [
            EngineRequest::Search { query: "  ".into(), mode: None, k: None },
            EngineRequest::Search { query: "x".repeat(MAX_QUERY_CHARS + 1), mode: None, k: None },
            EngineRequest::Search { query: "ok".into(), mode: None, k: Some(0) },
            EngineRequest::Search { query: "ok".into(), mode: None, k: Some(101) },
            EngineRequest::Retrieve {
                query: "ok".into(),
                top_k: None,
                min_similarity: None,
                max_per_document: None,
                max_per_domain: None,
                quality_weight: Some(1.5),
            },
        ] {
            let err = engine.try_handle(request).await.unwrap_err();
            assert!(matches!(err, RecallError::InvalidRequest(_)), "{err}");
        }
    }

    #[tokio::test]
    async fn test_handle_folds_errors() {
        let resp = engine()
            .handle(EngineRequest::Search { query: String::new(), mode: None, k: None })
            .await;
        match resp {
            EngineResponse::Error { message } => assert!(message.contains("empty")),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_record_visit_then_search_and_retrieve() {
        let engine = engine();
        let doc = engine
            .record_visit("https://tokio.rs/tokio/tutorial", "Tokio Tutorial", PAGE, 90)
            .await
            .unwrap();
        assert!(!doc.passages.is_empty());
        assert!(doc.passages.iter().all(|p| p.is_vectorized()));
        assert_eq!(doc.visit_count, 1);

        let resp = engine
            .try_handle(EngineRequest::Search {
                query: "tokio scheduler".into(),
                mode: None,
                k: Some(5),
            })
            .await
            .unwrap();
        let EngineResponse::Results { results } = resp else {
            panic!("expected results");
        };
        assert_eq!(results[0].document_id, doc.id);

        let resp = engine
            .try_handle(EngineRequest::Retrieve {
                query: "tokio asynchronous runtime scheduler tasks".into(),
                top_k: None,
                min_similarity: Some(0.0),
                max_per_document: None,
                max_per_domain: None,
                quality_weight: None,
            })
            .await
            .unwrap();
        let EngineResponse::Sources { sources, context } = resp else {
            panic!("expected sources");
        };
        assert_eq!(sources.len(), 1);
        assert!(context.starts_with("[1] Tokio Tutorial (https://tokio.rs/tokio/tutorial)"));
    }

    #[tokio::test]
    async fn test_revisit_replaces_and_accumulates() {
        let engine = engine();
        let first = engine.record_visit("https://tokio.rs", "Tokio", PAGE, 30).await.unwrap();
        let second = engine.record_visit("https://tokio.rs", "Tokio v2", PAGE, 45).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.visit_count, 2);
        assert_eq!(second.dwell_time_secs, 75);
        assert_eq!(engine.store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_short_page_gets_fallback_passage() {
        let engine = engine();
        let doc = engine
            .record_visit("https://a.dev", "Short", "<p>Just a few words.</p>", 5)
            .await
            .unwrap();
        assert_eq!(doc.passages.len(), 1);
        assert_eq!(doc.passages[0].text, "Just a few words.");
    }

    #[tokio::test]
    async fn test_empty_page_is_rejected() {
        let err = engine().record_visit("https://a.dev", "Empty", "", 5).await.unwrap_err();
        assert!(matches!(err, RecallError::InvalidDocument(_)));
    }

    #[tokio::test]
    async fn test_chunk_request() {
        let resp = engine()
            .try_handle(EngineRequest::Chunk { content: PAGE.to_string() })
            .await
            .unwrap();
        let EngineResponse::Passages { passages } = resp else {
            panic!("expected passages");
        };
        assert_eq!(passages.len(), 1);
    }
}
