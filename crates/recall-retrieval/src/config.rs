use recall_core::{RecallError, RecallResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::fusion::SearchMode;

/// Top-level engine configuration. Every field has a default, so an empty
/// TOML document yields a fully usable config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Passage chunker parameters.
    #[serde(default)]
    pub chunker: ChunkerConfig,
    /// Lexical scorer parameters.
    #[serde(default)]
    pub lexical: LexicalConfig,
    /// Rank fusion parameters.
    #[serde(default)]
    pub fusion: FusionConfig,
    /// Diversity retriever parameters.
    #[serde(default)]
    pub diversity: DiversityConfig,
    /// Result cache parameters.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl RecallConfig {
    /// Parse a config from a TOML string and validate it.
    pub fn from_toml_str(input: &str) -> RecallResult<Self> {
        let config: Self =
            toml::from_str(input).map_err(|e| RecallError::Config(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a config file.
    pub async fn load(path: &Path) -> RecallResult<Self> {
        let data = tokio::fs::read_to_string(path).await?;
        Self::from_toml_str(&data)
    }

    /// Reject parameter combinations the chunker and retriever cannot honor.
    ///
    /// Fusion weights are not checked here; malformed weights
    /// fall back to a uniform split at query time.
    pub fn validate(&self) -> RecallResult<()> {
        let c = &self.chunker;
        if c.max_words_per_passage == 0 {
            return Err(RecallError::Config("chunker.max_words_per_passage must be > 0".into()));
        }
        if c.min_words_per_passage > c.max_words_per_passage {
            return Err(RecallError::Config(
                "chunker.min_words_per_passage exceeds max_words_per_passage".into(),
            ));
        }
        if !c.overshoot_ratio.is_finite() || c.overshoot_ratio < 1.0 {
            return Err(RecallError::Config("chunker.overshoot_ratio must be >= 1.0".into()));
        }
        if !(c.boundary_min_fraction > 0.0 && c.boundary_min_fraction <= 1.0) {
            return Err(RecallError::Config(
                "chunker.boundary_min_fraction must be in (0, 1]".into(),
            ));
        }
        if c.max_passages == 0 {
            return Err(RecallError::Config("chunker.max_passages must be > 0".into()));
        }
        if self.lexical.max_body_chars == 0 {
            return Err(RecallError::Config("lexical.max_body_chars must be > 0".into()));
        }
        if self.fusion.rrf_k < 0.0 || !self.fusion.rrf_k.is_finite() {
            return Err(RecallError::Config("fusion.rrf_k must be a finite value >= 0".into()));
        }
        if self.fusion.oversample == 0 {
            return Err(RecallError::Config("fusion.oversample must be > 0".into()));
        }
        let t = &self.fusion.confidence;
        if t.medium_similarity > t.high_similarity {
            return Err(RecallError::Config(
                "fusion.confidence.medium_similarity exceeds high_similarity".into(),
            ));
        }
        let d = &self.diversity;
        if !(0.0..=1.0).contains(&d.quality_weight) {
            return Err(RecallError::Config("diversity.quality_weight must be in [0, 1]".into()));
        }
        if d.max_per_document == 0 || d.max_per_domain == 0 {
            return Err(RecallError::Config("diversity caps must be > 0".into()));
        }
        if self.cache.enabled && self.cache.capacity == 0 {
            return Err(RecallError::Config("cache.capacity must be > 0 when enabled".into()));
        }
        Ok(())
    }
}

/// Passage chunker parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkerConfig {
    /// Visible characters a content root candidate must exceed to be accepted.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,
    /// CSS selectors tried after the semantic container tags.
    #[serde(default = "default_content_selectors")]
    pub content_selectors: Vec<String>,
    /// Leaf text below this many words is discarded.
    #[serde(default = "default_min_words")]
    pub min_words_per_passage: usize,
    /// Target upper bound for passage size, in words.
    #[serde(default = "default_max_words")]
    pub max_words_per_passage: usize,
    /// How far a single merge or split tail may exceed the maximum.
    #[serde(default = "default_overshoot_ratio")]
    pub overshoot_ratio: f64,
    /// Snap long-text split points to sentence and paragraph breaks.
    #[serde(default = "default_true")]
    pub prefer_boundaries: bool,
    /// Smallest fraction of the split target a snapped piece may shrink to.
    #[serde(default = "default_boundary_min_fraction")]
    pub boundary_min_fraction: f64,
    /// Maximum passages kept per document.
    #[serde(default = "default_max_passages")]
    pub max_passages: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
            content_selectors: default_content_selectors(),
            min_words_per_passage: default_min_words(),
            max_words_per_passage: default_max_words(),
            overshoot_ratio: default_overshoot_ratio(),
            prefer_boundaries: true,
            boundary_min_fraction: default_boundary_min_fraction(),
            max_passages: default_max_passages(),
        }
    }
}

/// Lexical (TF-IDF) scorer parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LexicalConfig {
    /// Weight of the title field.
    #[serde(default = "default_title_weight")]
    pub title_weight: f64,
    /// Weight of the concatenated passage text field.
    #[serde(default = "default_passage_weight")]
    pub passage_weight: f64,
    /// Weight of the URL field.
    #[serde(default = "default_url_weight")]
    pub url_weight: f64,
    /// Weight of the truncated body field.
    #[serde(default = "default_body_weight")]
    pub body_weight: f64,
    /// Body characters scanned per document.
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,
    /// Scores below this are discarded.
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    /// Multiplier when the literal query or a quoted phrase appears verbatim.
    #[serde(default = "default_exact_phrase_boost")]
    pub exact_phrase_boost: f64,
    /// Multiplier when the document's domain appears in the query.
    #[serde(default = "default_domain_boost")]
    pub domain_boost: f64,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            title_weight: default_title_weight(),
            passage_weight: default_passage_weight(),
            url_weight: default_url_weight(),
            body_weight: default_body_weight(),
            max_body_chars: default_max_body_chars(),
            min_score: default_min_score(),
            exact_phrase_boost: default_exact_phrase_boost(),
            domain_boost: default_domain_boost(),
        }
    }
}

/// Similarity and keyword thresholds for the confidence band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceThresholds {
    /// Semantic similarity at or above which a result is `high` on its own.
    #[serde(default = "default_high_similarity")]
    pub high_similarity: f32,
    /// Lower edge of the semantic band that needs corroboration.
    #[serde(default = "default_medium_similarity")]
    pub medium_similarity: f32,
    /// Keyword score above which a weak semantic match is still `medium`.
    #[serde(default = "default_strong_keyword_score")]
    pub strong_keyword_score: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high_similarity: default_high_similarity(),
            medium_similarity: default_medium_similarity(),
            strong_keyword_score: default_strong_keyword_score(),
        }
    }
}

/// Rank fusion parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionConfig {
    /// RRF smoothing constant `K`.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    /// Semantic share of the fusion weights (`alpha`); keyword gets `1 - alpha`.
    #[serde(default = "default_semantic_weight")]
    pub semantic_weight: f64,
    /// Each scorer is asked for `k * oversample` candidates before fusion.
    #[serde(default = "default_oversample")]
    pub oversample: usize,
    /// Results returned when a request does not say.
    #[serde(default = "default_top_k")]
    pub default_top_k: usize,
    /// Mode used when a request does not say.
    #[serde(default)]
    pub default_mode: SearchMode,
    /// Confidence band thresholds.
    #[serde(default)]
    pub confidence: ConfidenceThresholds,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            rrf_k: default_rrf_k(),
            semantic_weight: default_semantic_weight(),
            oversample: default_oversample(),
            default_top_k: default_top_k(),
            default_mode: SearchMode::default(),
            confidence: ConfidenceThresholds::default(),
        }
    }
}

impl FusionConfig {
    /// The `[semantic, keyword]` weight vector handed to the fuser.
    pub fn weights(&self) -> [f64; 2] {
        [self.semantic_weight, 1.0 - self.semantic_weight]
    }
}

/// Diversity retriever parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityConfig {
    /// Passages returned.
    #[serde(default = "default_context_top_k")]
    pub top_k: usize,
    /// Inclusive similarity floor.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
    /// Passages accepted per document.
    #[serde(default = "default_max_per_document")]
    pub max_per_document: usize,
    /// Documents accepted per domain.
    #[serde(default = "default_max_per_domain")]
    pub max_per_domain: usize,
    /// Share of the combined score taken from passage quality.
    #[serde(default = "default_quality_weight")]
    pub quality_weight: f32,
}

impl Default for DiversityConfig {
    fn default() -> Self {
        Self {
            top_k: default_context_top_k(),
            min_similarity: default_min_similarity(),
            max_per_document: default_max_per_document(),
            max_per_domain: default_max_per_domain(),
            quality_weight: default_quality_weight(),
        }
    }
}

/// Read-through result cache parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether search results are cached at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Maximum cached queries.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Entry lifetime in seconds.
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_min_content_chars() -> usize {
    200
}
fn default_content_selectors() -> Vec<String> {
    [
        "#content",
        "#main-content",
        ".content",
        ".post-content",
        ".entry-content",
        ".article-body",
        ".markdown-body",
    ]
    .iter()
    .map(|s| (*s).to_string())
    .collect()
}
fn default_min_words() -> usize {
    10
}
fn default_max_words() -> usize {
    200
}
fn default_overshoot_ratio() -> f64 {
    1.25
}
fn default_boundary_min_fraction() -> f64 {
    0.7
}
fn default_max_passages() -> usize {
    30
}
fn default_title_weight() -> f64 {
    3.0
}
fn default_passage_weight() -> f64 {
    2.0
}
fn default_url_weight() -> f64 {
    1.5
}
fn default_body_weight() -> f64 {
    1.0
}
fn default_max_body_chars() -> usize {
    10_000
}
fn default_min_score() -> f64 {
    0.01
}
fn default_exact_phrase_boost() -> f64 {
    2.0
}
fn default_domain_boost() -> f64 {
    1.5
}
fn default_high_similarity() -> f32 {
    0.68
}
fn default_medium_similarity() -> f32 {
    0.58
}
fn default_strong_keyword_score() -> f64 {
    0.5
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_semantic_weight() -> f64 {
    0.9
}
fn default_oversample() -> usize {
    3
}
fn default_top_k() -> usize {
    10
}
fn default_context_top_k() -> usize {
    8
}
fn default_min_similarity() -> f32 {
    0.58
}
fn default_max_per_document() -> usize {
    3
}
fn default_max_per_domain() -> usize {
    2
}
fn default_quality_weight() -> f32 {
    0.3
}
fn default_cache_capacity() -> usize {
    128
}
fn default_cache_ttl_secs() -> u64 {
    300
}
