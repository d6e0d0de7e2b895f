use async_trait::async_trait;
use recall_core::{Passage, RecallError, RecallResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which side of a retrieval pair a text is embedded for.
///
/// Asymmetric models prefix queries and documents differently; symmetric
/// providers may ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingRole {
    /// A search query.
    Query,
    /// A passage being indexed.
    Document,
}

/// Trait for computing unit-normalized text embeddings.
///
/// Similarity between two vectors from the same provider is a plain dot
/// product; callers never re-normalize.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Compute the embedding vector for a single text.
    async fn embed(&self, text: &str, role: EmbeddingRole) -> RecallResult<Vec<f32>>;

    /// Compute embeddings for a batch of texts.
    async fn embed_batch(&self, texts: &[&str], role: EmbeddingRole) -> RecallResult<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, role).await?);
        }
        Ok(results)
    }

    /// Dimension of the embedding vectors produced by this provider.
    fn dimension(&self) -> usize;
}

/// Attach document-role embeddings to every passage that lacks one.
pub async fn embed_passages(
    provider: &dyn EmbeddingProvider,
    passages: &mut [Passage],
) -> RecallResult<()> {
    let pending: Vec<usize> = passages
        .iter()
        .enumerate()
        .filter(|(_, p)| !p.is_vectorized())
        .map(|(i, _)| i)
        .collect();
    if pending.is_empty() {
        return Ok(());
    }

    let texts: Vec<&str> = pending.iter().map(|&i| passages[i].text.as_str()).collect();
    let vectors = provider.embed_batch(&texts, EmbeddingRole::Document).await?;
    if vectors.len() != pending.len() {
        return Err(RecallError::Embedding(format!(
            "Provider returned {} vectors for {} passages",
            vectors.len(),
            pending.len()
        )));
    }
    for (i, vector) in pending.into_iter().zip(vectors) {
        passages[i].embedding = Some(vector);
    }
    Ok(())
}

/// Dot product of two pre-normalized vectors.
///
/// Returns `None` for empty or dimension-mismatched inputs, which callers
/// treat the same as a missing embedding.
pub fn similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

/// Local bag-of-words embedding (no external model needed).
///
/// Hashes term frequencies into a fixed-size vector and L2-normalizes it.
/// Deterministic and cheap; swap in a real model provider for production
/// quality semantic search.
pub struct LocalEmbedding {
    dimension: usize,
}

impl LocalEmbedding {
    /// Create a provider producing vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }
}

impl Default for LocalEmbedding {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbedding {
    async fn embed(&self, text: &str, _role: EmbeddingRole) -> RecallResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RecallError::Embedding("Cannot embed empty text".to_string()));
        }

        let mut vector = vec![0.0f32; self.dimension];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() > 1)
            .collect();

        let total = words.len() as f32;
        if total == 0.0 {
            return Ok(vector);
        }

        let mut freq: HashMap<&str, f32> = HashMap::new();
        for word in &words {
            *freq.entry(word).or_insert(0.0) += 1.0;
        }

        // Fixed accumulation order keeps vectors bit-identical across runs.
        let mut terms: Vec<(&str, f32)> = freq.into_iter().collect();
        terms.sort_by(|a, b| a.0.cmp(b.0));

        for (word, count) in terms {
            let tf = count / total;
            let hash1 = fnv1a(word.as_bytes()) as usize;
            let hash2 = fnv1a(&[word.as_bytes(), &[1u8]].concat()) as usize;
            let hash3 = fnv1a(&[word.as_bytes(), &[2u8]].concat()) as usize;

            vector[hash1 % self.dimension] += tf;
            vector[hash2 % self.dimension] += tf * 0.7;
            vector[hash3 % self.dimension] += tf * 0.5;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// FNV-1a, 32-bit.
fn fnv1a(data: &[u8]) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for &byte in data {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}
