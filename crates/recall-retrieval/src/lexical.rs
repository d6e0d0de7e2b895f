//! Field-weighted TF-IDF keyword scoring.
//!
//! The index is rebuilt from the corpus snapshot on every query; nothing is
//! persisted between calls.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use recall_core::Document;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::chunker::page_text;
use crate::config::LexicalConfig;

/// Tokens shorter than this are dropped.
const MIN_TOKEN_CHARS: usize = 3;

static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "had", "her",
        "was", "one", "our", "out", "has", "him", "his", "how", "its", "may", "new", "now",
        "old", "see", "two", "way", "who", "did", "get", "let", "say", "she", "too", "use",
        "with", "this", "that", "from", "they", "have", "been", "were", "what", "when", "which",
        "will", "your", "there", "their", "would", "about", "into", "than", "then", "them",
        "these", "those", "some", "such", "only", "also", "just", "more", "most", "other",
        "over", "very", "does", "doing", "being", "here", "where", "while", "should", "could",
        "each", "both", "because", "after", "before", "between", "through", "during", "again",
        "why", "own", "same", "off", "once", "under", "until", "above", "below",
    ]
    .into_iter()
    .collect()
});

#[allow(clippy::expect_used)]
static QUOTED_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""([^"]+)""#).expect("quoted phrase pattern is valid"));

/// Tokenize text for keyword matching.
///
/// Lowercases, treats every non-alphanumeric character except `.` as a
/// separator, trims leading and trailing dots (so `node.js` survives but a
/// sentence-final `react.` becomes `react`), then drops short tokens and
/// stop words.
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '.' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    normalized
        .split_whitespace()
        .map(|t| t.trim_matches('.'))
        .filter(|t| t.chars().count() >= MIN_TOKEN_CHARS && !STOP_WORDS.contains(t))
        .map(str::to_string)
        .collect()
}

/// A keyword match for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalHit {
    /// The matched document.
    pub document_id: Uuid,
    /// Field-weighted TF-IDF score after bonuses.
    pub score: f64,
    /// Distinct query terms found in at least one field, in query order.
    pub matched_terms: Vec<String>,
}

/// Term counts for one document field.
struct FieldIndex {
    counts: HashMap<String, usize>,
    len: usize,
    weight: f64,
}

impl FieldIndex {
    fn build(text: &str, weight: f64) -> Self {
        let tokens = tokenize(text);
        let len = tokens.len();
        let mut counts = HashMap::new();
        for token in tokens {
            *counts.entry(token).or_insert(0) += 1;
        }
        Self { counts, len, weight }
    }

    fn tf(&self, term: &str) -> f64 {
        if self.len == 0 {
            return 0.0;
        }
        self.counts.get(term).copied().unwrap_or(0) as f64 / self.len as f64
    }

    fn contains(&self, term: &str) -> bool {
        self.counts.contains_key(term)
    }
}

/// Per-document view built for one query.
struct DocumentFields<'a> {
    document: &'a Document,
    /// Title, passage text, URL, body.
    fields: [FieldIndex; 4],
    title_lower: String,
    passages_lower: String,
}

/// Scores a query against a document collection with field-weighted TF-IDF.
#[derive(Debug, Clone, Default)]
pub struct LexicalScorer {
    config: LexicalConfig,
}

impl LexicalScorer {
    /// Create a scorer with the given field weights and bonuses.
    pub fn new(config: LexicalConfig) -> Self {
        Self { config }
    }

    /// The active parameters.
    pub fn config(&self) -> &LexicalConfig {
        &self.config
    }

    /// Rank searchable documents in `corpus` against `query`.
    ///
    /// Returns at most `k` hits with score `>= min_score`, ordered by score
    /// descending with corpus order breaking ties. Queries that reduce to no
    /// usable tokens return an empty list.
    pub fn search(&self, query: &str, corpus: &[Document], k: usize, min_score: f64) -> Vec<LexicalHit> {
        let terms = unique_terms(query);
        if terms.is_empty() || k == 0 {
            debug!(query, "keyword query has no usable terms");
            return Vec::new();
        }

        let docs: Vec<DocumentFields<'_>> = corpus
            .iter()
            .filter(|d| d.is_searchable())
            .map(|d| self.index_document(d))
            .collect();
        if docs.is_empty() {
            return Vec::new();
        }

        let n = docs.len() as f64;
        let idf: Vec<f64> = terms
            .iter()
            .map(|term| {
                let df = docs
                    .iter()
                    .filter(|d| d.fields.iter().any(|f| f.contains(term)))
                    .count();
                if df == 0 {
                    0.0
                } else {
                    (n / df as f64).ln()
                }
            })
            .collect();

        let query_lower = query.trim().to_lowercase();
        let phrases = quoted_phrases(&query_lower);

        let mut hits: Vec<LexicalHit> = Vec::new();
        for doc in &docs {
            let mut score = 0.0;
            let mut matched_terms = Vec::new();

            for (term, idf) in terms.iter().zip(&idf) {
                let mut matched = false;
                for field in &doc.fields {
                    let tf = field.tf(term);
                    if tf > 0.0 {
                        matched = true;
                        score += tf * idf * field.weight;
                    }
                }
                if matched {
                    matched_terms.push(term.clone());
                }
            }

            if matched_terms.is_empty() {
                continue;
            }

            if contains_phrase(doc, &query_lower, &phrases) {
                score *= self.config.exact_phrase_boost;
            }
            let domain = doc.document.domain();
            if !domain.is_empty() && query_lower.contains(&domain) {
                score *= self.config.domain_boost;
            }

            if score >= min_score {
                hits.push(LexicalHit {
                    document_id: doc.document.id,
                    score,
                    matched_terms,
                });
            }
        }

        // Stable sort keeps corpus order for equal scores.
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);

        debug!(query, candidates = docs.len(), hits = hits.len(), "keyword search");
        hits
    }

    fn index_document<'a>(&self, document: &'a Document) -> DocumentFields<'a> {
        let passages = document.passage_text();
        let body: String = page_text(&document.raw_text)
            .chars()
            .take(self.config.max_body_chars)
            .collect();

        DocumentFields {
            document,
            fields: [
                FieldIndex::build(&document.title, self.config.title_weight),
                FieldIndex::build(&passages, self.config.passage_weight),
                FieldIndex::build(&document.url, self.config.url_weight),
                FieldIndex::build(&body, self.config.body_weight),
            ],
            title_lower: document.title.to_lowercase(),
            passages_lower: passages.to_lowercase(),
        }
    }
}

fn unique_terms(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

fn quoted_phrases(query_lower: &str) -> Vec<String> {
    QUOTED_PHRASE
        .captures_iter(query_lower)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

fn contains_phrase(doc: &DocumentFields<'_>, query_lower: &str, phrases: &[String]) -> bool {
    let in_doc = |needle: &str| doc.title_lower.contains(needle) || doc.passages_lower.contains(needle);
    (!query_lower.is_empty() && in_doc(query_lower)) || phrases.iter().any(|p| in_doc(p))
}
