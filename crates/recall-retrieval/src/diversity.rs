//! Diversity-constrained passage retrieval.
//!
//! Blends semantic relevance with passage quality, then greedily picks the
//! top passages under per-document and per-domain caps so the assembled
//! context is not dominated by one source.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use recall_core::{Document, Passage, RecallResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::DiversityConfig;
use crate::embedding::{EmbeddingProvider, EmbeddingRole};
use crate::store::CorpusStore;
use crate::vector::{score_passages, PassageMatch};

/// A passage selected for context, with its source metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    /// The selected passage.
    pub passage: Passage,
    /// Owning document.
    pub document_id: Uuid,
    /// Owning document URL.
    pub document_url: String,
    /// Owning document title.
    pub document_title: String,
    /// Query similarity.
    pub similarity: f32,
    /// `similarity * (1 - w) + quality * w`.
    pub combined_score: f32,
    /// Visit count of the owning document.
    pub visit_count: u32,
    /// Last visit of the owning document.
    pub last_visited_at: Option<DateTime<Utc>>,
    /// Dwell time on the owning document, in seconds.
    pub dwell_time_secs: u64,
}

/// Retrieved passages re-bucketed under their source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceGroup {
    /// 1-based source label, in first-seen order.
    pub ordinal: usize,
    /// Source document.
    pub document_id: Uuid,
    /// Source URL.
    pub url: String,
    /// Source title.
    pub title: String,
    /// Visit count, verbatim.
    pub visit_count: u32,
    /// Last visit, verbatim.
    pub last_visited_at: Option<DateTime<Utc>>,
    /// Dwell time in seconds, verbatim.
    pub dwell_time_secs: u64,
    /// Passages from this source, in retrieval order.
    pub passages: Vec<Passage>,
}

/// Retrieves a bounded, source-diverse passage set for a query.
pub struct DiversityRetriever {
    store: Arc<dyn CorpusStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    defaults: DiversityConfig,
}

impl DiversityRetriever {
    /// Create a retriever with default options from `config`.
    pub fn new(
        store: Arc<dyn CorpusStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: DiversityConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            defaults: config,
        }
    }

    /// Options used when a caller does not supply its own.
    pub fn defaults(&self) -> &DiversityConfig {
        &self.defaults
    }

    /// Embed the query and select passages with the default options.
    pub async fn retrieve_default(&self, query: &str) -> RecallResult<Vec<RetrievedPassage>> {
        self.retrieve(query, &self.defaults).await
    }

    /// Embed the query and select passages from the current corpus.
    ///
    /// Only the embedding call can fail.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &DiversityConfig,
    ) -> RecallResult<Vec<RetrievedPassage>> {
        if query.trim().is_empty() || options.top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query, EmbeddingRole::Query).await?;
        let corpus = self.store.all_documents().await?;
        let selected = select_diverse(&query_vector, &corpus, options);
        info!(
            query,
            corpus = corpus.len(),
            selected = selected.len(),
            "Context passages retrieved"
        );
        Ok(selected)
    }
}

/// Score, filter, re-rank and greedily cap passages.
///
/// Candidates need `similarity >= min_similarity`. They are ordered by
/// `(combined desc, similarity desc, corpus order, position)` and accepted
/// in one pass while their document holds fewer than `max_per_document`
/// passages and their domain fewer than `max_per_domain` documents. A
/// document already accepted in its domain does not count again. Documents
/// without a host are only subject to the per-document cap.
pub fn select_diverse(
    query_vector: &[f32],
    corpus: &[Document],
    options: &DiversityConfig,
) -> Vec<RetrievedPassage> {
    let w = options.quality_weight.clamp(0.0, 1.0);

    let mut candidates: Vec<(PassageMatch<'_>, f32)> = score_passages(query_vector, corpus)
        .into_iter()
        .filter(|m| m.similarity >= options.min_similarity)
        .map(|m| {
            let combined = m.similarity * (1.0 - w) + m.passage.quality * w;
            (m, combined)
        })
        .collect();

    candidates.sort_by(|(a, ca), (b, cb)| {
        cb.total_cmp(ca)
            .then_with(|| b.similarity.total_cmp(&a.similarity))
            .then_with(|| a.corpus_index.cmp(&b.corpus_index))
            .then_with(|| a.passage.position.cmp(&b.passage.position))
    });

    let mut per_document: HashMap<Uuid, usize> = HashMap::new();
    let mut per_domain: HashMap<String, HashSet<Uuid>> = HashMap::new();
    let mut selected = Vec::new();

    for (m, combined) in &candidates {
        if selected.len() >= options.top_k {
            break;
        }
        let doc = m.document;

        let doc_count = per_document.get(&doc.id).copied().unwrap_or(0);
        if doc_count >= options.max_per_document {
            continue;
        }

        let domain = doc.domain();
        if !domain.is_empty() {
            let docs_in_domain = per_domain.entry(domain).or_default();
            if !docs_in_domain.contains(&doc.id) {
                if docs_in_domain.len() >= options.max_per_domain {
                    continue;
                }
                docs_in_domain.insert(doc.id);
            }
        }

        *per_document.entry(doc.id).or_insert(0) += 1;
        selected.push(RetrievedPassage {
            passage: m.passage.clone(),
            document_id: doc.id,
            document_url: doc.url.clone(),
            document_title: doc.title.clone(),
            similarity: m.similarity,
            combined_score: *combined,
            visit_count: doc.visit_count,
            last_visited_at: doc.last_visited_at,
            dwell_time_secs: doc.dwell_time_secs,
        });
    }

    debug!(
        candidates = candidates.len(),
        selected = selected.len(),
        "diversity selection"
    );
    selected
}

/// Group retrieved passages by source document in first-seen order.
pub fn group_by_document(passages: &[RetrievedPassage]) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    let mut slots: HashMap<Uuid, usize> = HashMap::new();

    for rp in passages {
        let slot = *slots.entry(rp.document_id).or_insert_with(|| {
            groups.push(SourceGroup {
                ordinal: groups.len() + 1,
                document_id: rp.document_id,
                url: rp.document_url.clone(),
                title: rp.document_title.clone(),
                visit_count: rp.visit_count,
                last_visited_at: rp.last_visited_at,
                dwell_time_secs: rp.dwell_time_secs,
                passages: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].passages.push(rp.passage.clone());
    }
    groups
}
