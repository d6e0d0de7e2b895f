//! Weighted Reciprocal Rank Fusion and confidence classification.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::config::ConfidenceThresholds;

/// Which relevance signals a search uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Embedding similarity only.
    Semantic,
    /// TF-IDF keyword score only.
    Keyword,
    /// Both, fused with weighted RRF.
    #[default]
    Hybrid,
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Semantic => write!(f, "semantic"),
            Self::Keyword => write!(f, "keyword"),
            Self::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "semantic" => Ok(Self::Semantic),
            "keyword" => Ok(Self::Keyword),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown search mode '{other}'")),
        }
    }
}

/// Coarse trust band attached to every ranked result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Strong semantic match, or a borderline one corroborated by keywords.
    High,
    /// Borderline semantic match alone, or a strong keyword match.
    Medium,
    /// Everything else.
    Low,
}

impl Confidence {
    /// Classify a result from its semantic similarity and keyword score.
    ///
    /// A keyword score of `None` or `<= 0` counts as no keyword match.
    pub fn classify(
        semantic: Option<f32>,
        lexical: Option<f64>,
        thresholds: &ConfidenceThresholds,
    ) -> Self {
        let keyword_match = lexical.is_some_and(|s| s > 0.0);
        let strong_keyword = lexical.is_some_and(|s| s > thresholds.strong_keyword_score);

        match semantic {
            Some(s) if s >= thresholds.high_similarity => Self::High,
            Some(s) if s >= thresholds.medium_similarity => {
                if keyword_match {
                    Self::High
                } else {
                    Self::Medium
                }
            }
            _ if strong_keyword => Self::Medium,
            _ => Self::Low,
        }
    }
}

/// One document after fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedEntry {
    /// The fused document.
    pub id: Uuid,
    /// `Σ wᵢ / (K + rankᵢ)` over the lists containing the document.
    pub score: f64,
    /// 1-based rank in each input list, `None` when absent.
    pub ranks: Vec<Option<usize>>,
}

/// Normalize fusion weights to sum to 1.
///
/// Wrong length, a negative or non-finite entry, or a non-positive sum
/// falls back to a uniform split.
pub fn normalize_weights(weights: &[f64], lists: usize) -> Vec<f64> {
    if lists == 0 {
        return Vec::new();
    }
    let uniform = vec![1.0 / lists as f64; lists];

    if weights.len() != lists {
        warn!(expected = lists, got = weights.len(), "Fusion weight count mismatch, using uniform weights");
        return uniform;
    }
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        warn!(?weights, "Invalid fusion weight, using uniform weights");
        return uniform;
    }
    let sum: f64 = weights.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        warn!(?weights, "Fusion weights sum to zero, using uniform weights");
        return uniform;
    }
    weights.iter().map(|w| w / sum).collect()
}

/// Fuse ranked id lists with weighted Reciprocal Rank Fusion.
///
/// Ranks are 1-based and only an id's first occurrence in a list counts.
/// Output is ordered by fused score descending, then by rank in list 0,
/// list 1, and so on (absent last), then by id.
pub fn fuse(lists: &[Vec<Uuid>], weights: &[f64], k: f64) -> Vec<FusedEntry> {
    let weights = normalize_weights(weights, lists.len());
    let mut index: HashMap<Uuid, usize> = HashMap::new();
    let mut entries: Vec<FusedEntry> = Vec::new();

    for (list_idx, list) in lists.iter().enumerate() {
        for (pos, id) in list.iter().enumerate() {
            let slot = *index.entry(*id).or_insert_with(|| {
                entries.push(FusedEntry {
                    id: *id,
                    score: 0.0,
                    ranks: vec![None; lists.len()],
                });
                entries.len() - 1
            });
            let entry = &mut entries[slot];
            if entry.ranks[list_idx].is_none() {
                let rank = pos + 1;
                entry.ranks[list_idx] = Some(rank);
                entry.score += weights[list_idx] / (k + rank as f64);
            }
        }
    }

    entries.sort_by(compare_fused);
    entries
}

fn compare_fused(a: &FusedEntry, b: &FusedEntry) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| {
            a.ranks
                .iter()
                .zip(&b.ranks)
                .map(|(ra, rb)| compare_rank(*ra, *rb))
                .find(|o| o.is_ne())
                .unwrap_or(Ordering::Equal)
        })
        .then_with(|| a.id.cmp(&b.id))
}

fn compare_rank(a: Option<usize>, b: Option<usize>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// A search result as exposed to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// The matched document.
    pub document_id: Uuid,
    /// Document URL.
    pub url: String,
    /// Document title.
    pub title: String,
    /// Final ranking score (RRF in hybrid mode, the raw signal otherwise).
    pub fused_score: f64,
    /// Best passage similarity, when the document was semantically scored.
    pub semantic_score: Option<f32>,
    /// Keyword score, when the document matched lexically.
    pub lexical_score: Option<f64>,
    /// 1-based rank in the semantic list.
    pub semantic_rank: Option<usize>,
    /// 1-based rank in the keyword list.
    pub lexical_rank: Option<usize>,
    /// Trust band.
    pub confidence: Confidence,
    /// Query terms the document matched.
    #[serde(default)]
    pub matched_terms: Vec<String>,
    /// The passage behind `semantic_score`.
    pub best_passage_id: Option<Uuid>,
}
