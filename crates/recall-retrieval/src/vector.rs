//! Brute-force semantic scoring over pre-normalized passage vectors.

use recall_core::{Document, Passage};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::similarity;

/// One vectorized passage scored against a query.
#[derive(Debug, Clone, Copy)]
pub struct PassageMatch<'a> {
    /// The owning document.
    pub document: &'a Document,
    /// The scored passage.
    pub passage: &'a Passage,
    /// Index of the owning document in the corpus snapshot.
    pub corpus_index: usize,
    /// Dot-product similarity with the query vector.
    pub similarity: f32,
}

/// A document's semantic score: its best passage similarity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorHit {
    /// The matched document.
    pub document_id: Uuid,
    /// Highest passage similarity in the document.
    pub similarity: f32,
    /// The passage that produced `similarity`.
    pub best_passage_id: Uuid,
}

/// Score every vectorized passage in the corpus, in corpus then position order.
///
/// Passages without an embedding, or whose dimension differs from the query
/// vector, are skipped.
pub fn score_passages<'a>(query_vector: &[f32], corpus: &'a [Document]) -> Vec<PassageMatch<'a>> {
    corpus
        .iter()
        .enumerate()
        .flat_map(|(corpus_index, document)| {
            document.passages.iter().filter_map(move |passage| {
                let embedding = passage.embedding.as_deref()?;
                let similarity = similarity(query_vector, embedding)?;
                Some(PassageMatch {
                    document,
                    passage,
                    corpus_index,
                    similarity,
                })
            })
        })
        .collect()
}

/// Rank documents by best passage similarity, descending, keeping `k`.
///
/// Equal similarities keep corpus order.
pub fn rank_documents(query_vector: &[f32], corpus: &[Document], k: usize) -> Vec<VectorHit> {
    let mut hits: Vec<VectorHit> = Vec::new();
    let mut last_index = None;

    for m in score_passages(query_vector, corpus) {
        let is_same_doc = last_index == Some(m.corpus_index);
        match hits.last_mut() {
            Some(best) if is_same_doc => {
                if m.similarity > best.similarity {
                    best.similarity = m.similarity;
                    best.best_passage_id = m.passage.id;
                }
            }
            _ => {
                hits.push(VectorHit {
                    document_id: m.document.id,
                    similarity: m.similarity,
                    best_passage_id: m.passage.id,
                });
                last_index = Some(m.corpus_index);
            }
        }
    }

    hits.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    hits.truncate(k);
    hits
}
