use std::collections::HashMap;
use std::sync::Arc;

use recall_core::{Document, RecallResult};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::{CacheStats, ResultCache};
use crate::config::{FusionConfig, RecallConfig};
use crate::embedding::{EmbeddingProvider, EmbeddingRole};
use crate::fusion::{fuse, Confidence, RankedResult, SearchMode};
use crate::lexical::{LexicalHit, LexicalScorer};
use crate::store::CorpusStore;
use crate::vector::{rank_documents, VectorHit};

/// Hybrid searcher that combines dense vector search with TF-IDF keyword
/// search using weighted Reciprocal Rank Fusion (RRF).
///
/// This provides better recall than either method alone:
/// - Vector search captures semantic similarity (meaning)
/// - TF-IDF captures exact keyword matches (lexical)
///
/// The fusion weights come from `fusion.semantic_weight` (`alpha`):
/// - `alpha = 1.0`: pure vector ranking
/// - `alpha = 0.0`: pure keyword ranking
/// - `alpha = 0.9`: semantic-leaning blend (default)
pub struct HybridSearcher {
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    lexical: LexicalScorer,
    fusion: FusionConfig,
    cache: Option<ResultCache>,
}

impl HybridSearcher {
    /// Create a searcher over `store`, caching results when the config enables it.
    pub fn new(
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &RecallConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            lexical: LexicalScorer::new(config.lexical.clone()),
            fusion: config.fusion.clone(),
            cache: ResultCache::from_config(&config.cache),
        }
    }

    /// Replace the result cache. Chainable builder method.
    pub fn with_cache(mut self, cache: Option<ResultCache>) -> Self {
        self.cache = cache;
        self
    }

    /// The active fusion parameters.
    pub fn fusion_config(&self) -> &FusionConfig {
        &self.fusion
    }

    /// Drop cached results. Call after the corpus changes.
    pub fn invalidate_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    /// Cache counters, when caching is enabled.
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(ResultCache::stats)
    }

    /// Search the corpus, returning up to `k` ranked documents.
    ///
    /// In hybrid mode both scorers run concurrently over one corpus snapshot,
    /// each producing `k * oversample` candidates, and the fused score is:
    /// ```text
    /// score = w_sem / (rrf_k + semantic_rank)
    ///       + w_kw  / (rrf_k + keyword_rank)
    /// ```
    /// A document missing from one list gets nothing from it. Results are
    /// ordered by `(score desc, semantic rank, keyword rank, id)`.
    ///
    /// Embedding failures propagate; every other degenerate input yields an
    /// empty list.
    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        k: usize,
    ) -> RecallResult<Vec<RankedResult>> {
        if query.trim().is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        if let Some(cached) = self.cache.as_ref().and_then(|c| c.get(query, mode, k)) {
            debug!(query, %mode, k, "search served from cache");
            return Ok(cached);
        }

        let generation = self.cache.as_ref().map(ResultCache::generation);
        let corpus = self.store.all_documents().await?;
        let fetch_k = k.saturating_mul(self.fusion.oversample.max(1));

        let results = match mode {
            SearchMode::Semantic => {
                let hits = self.semantic(query, &corpus, k).await?;
                self.semantic_only(&corpus, hits)
            }
            SearchMode::Keyword => {
                let hits = self.keyword(query, &corpus, k);
                self.keyword_only(&corpus, hits)
            }
            SearchMode::Hybrid => {
                let (semantic, keyword) = tokio::join!(
                    self.semantic(query, &corpus, fetch_k),
                    async { self.keyword(query, &corpus, fetch_k) }
                );
                self.fuse_hits(&corpus, semantic?, keyword, k)
            }
        };

        info!(
            query,
            %mode,
            corpus = corpus.len(),
            results = results.len(),
            "Search complete"
        );

        if let (Some(cache), Some(generation)) = (&self.cache, generation) {
            if !cache.put_if_current(query, mode, k, generation, results.clone()) {
                debug!(query, %mode, k, "corpus changed during search, result not cached");
            }
        }
        Ok(results)
    }

    async fn semantic(
        &self,
        query: &str,
        corpus: &[Document],
        limit: usize,
    ) -> RecallResult<Vec<VectorHit>> {
        let query_vector = self.embedder.embed(query, EmbeddingRole::Query).await?;
        Ok(rank_documents(&query_vector, corpus, limit))
    }

    fn keyword(&self, query: &str, corpus: &[Document], limit: usize) -> Vec<LexicalHit> {
        let min_score = self.lexical.config().min_score;
        self.lexical.search(query, corpus, limit, min_score)
    }

    fn semantic_only(&self, corpus: &[Document], hits: Vec<VectorHit>) -> Vec<RankedResult> {
        let docs = index_by_id(corpus);
        hits.into_iter()
            .enumerate()
            .filter_map(|(i, hit)| {
                let doc = docs.get(&hit.document_id)?;
                let mut result = self.result_for(doc, f64::from(hit.similarity), Some(&hit), None);
                result.semantic_rank = Some(i + 1);
                Some(result)
            })
            .collect()
    }

    fn keyword_only(&self, corpus: &[Document], hits: Vec<LexicalHit>) -> Vec<RankedResult> {
        let docs = index_by_id(corpus);
        hits.into_iter()
            .enumerate()
            .filter_map(|(i, hit)| {
                let doc = docs.get(&hit.document_id)?;
                let mut result = self.result_for(doc, hit.score, None, Some(&hit));
                result.lexical_rank = Some(i + 1);
                Some(result)
            })
            .collect()
    }

    fn fuse_hits(
        &self,
        corpus: &[Document],
        semantic: Vec<VectorHit>,
        keyword: Vec<LexicalHit>,
        k: usize,
    ) -> Vec<RankedResult> {
        let docs = index_by_id(corpus);
        let semantic_ids: Vec<Uuid> = semantic.iter().map(|h| h.document_id).collect();
        let keyword_ids: Vec<Uuid> = keyword.iter().map(|h| h.document_id).collect();
        let semantic_by_id: HashMap<Uuid, &VectorHit> =
            semantic.iter().map(|h| (h.document_id, h)).collect();
        let keyword_by_id: HashMap<Uuid, &LexicalHit> =
            keyword.iter().map(|h| (h.document_id, h)).collect();

        let fused = fuse(
            &[semantic_ids, keyword_ids],
            &self.fusion.weights(),
            self.fusion.rrf_k,
        );
        debug!(
            semantic = semantic.len(),
            keyword = keyword.len(),
            fused = fused.len(),
            "fused candidate lists"
        );

        fused
            .into_iter()
            .take(k)
            .filter_map(|entry| {
                let doc = docs.get(&entry.id)?;
                let mut result = self.result_for(
                    doc,
                    entry.score,
                    semantic_by_id.get(&entry.id).copied(),
                    keyword_by_id.get(&entry.id).copied(),
                );
                result.semantic_rank = entry.ranks.first().copied().flatten();
                result.lexical_rank = entry.ranks.get(1).copied().flatten();
                Some(result)
            })
            .collect()
    }

    fn result_for(
        &self,
        doc: &Document,
        fused_score: f64,
        semantic: Option<&VectorHit>,
        keyword: Option<&LexicalHit>,
    ) -> RankedResult {
        let semantic_score = semantic.map(|h| h.similarity);
        let lexical_score = keyword.map(|h| h.score);
        RankedResult {
            document_id: doc.id,
            url: doc.url.clone(),
            title: doc.title.clone(),
            fused_score,
            semantic_score,
            lexical_score,
            semantic_rank: None,
            lexical_rank: None,
            confidence: Confidence::classify(semantic_score, lexical_score, &self.fusion.confidence),
            matched_terms: keyword.map(|h| h.matched_terms.clone()).unwrap_or_default(),
            best_passage_id: semantic.map(|h| h.best_passage_id),
        }
    }
}

fn index_by_id(corpus: &[Document]) -> HashMap<Uuid, &Document> {
    corpus.iter().map(|d| (d.id, d)).collect()
}
