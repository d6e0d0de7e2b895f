use proptest::prelude::*;
use recall_core::{Document, Passage};
use recall_retrieval::{
    fuse, select_diverse, ChunkerConfig, DiversityConfig, LexicalScorer, PassageChunker,
};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

fn sentence() -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{2,8}", 5..25).prop_map(|words| format!("{}.", words.join(" ")))
}

fn paragraph() -> impl Strategy<Value = String> {
    prop::collection::vec(sentence(), 2..60).prop_map(|s| s.join(" "))
}

fn words(range: std::ops::Range<usize>) -> impl Strategy<Value = String> {
    prop::collection::vec("[a-z]{2,8}", range).prop_map(|w| w.join(" "))
}

/// Nested `div`/`section`/`blockquote`/`li` trees mixing loose text, short
/// blocks and long paragraphs. Yields `(html, visible text)`.
fn html_tree() -> impl Strategy<Value = (String, String)> {
    let text = || prop_oneof![words(1..6), words(6..30), paragraph()];
    let leaf = prop_oneof![
        text().prop_map(|t| (t.clone(), t)),
        text().prop_map(|t| (format!("<p>{t}</p>"), t)),
    ];
    leaf.prop_recursive(4, 40, 6, |inner| {
        (
            prop::sample::select(vec!["div", "section", "blockquote", "li"]),
            prop::collection::vec(inner, 1..6),
        )
            .prop_map(|(tag, children)| {
                let html = children.iter().map(|(h, _)| h.as_str()).collect::<Vec<_>>().join(" ");
                let text = children.iter().map(|(_, t)| t.as_str()).collect::<Vec<_>>().join(" ");
                (format!("<{tag}>{html}</{tag}>"), text)
            })
    })
}

fn id_list() -> impl Strategy<Value = Vec<Uuid>> {
    prop::collection::vec(1u128..40, 0..25)
        .prop_map(|ns| ns.into_iter().map(Uuid::from_u128).collect())
}

fn unit(similarity: f32) -> Vec<f32> {
    vec![similarity, (1.0 - similarity * similarity).max(0.0).sqrt()]
}

/// (domain index, [(similarity, quality)]) per document.
fn corpus_spec() -> impl Strategy<Value = Vec<(u8, Vec<(f32, f32)>)>> {
    prop::collection::vec(
        (0u8..3, prop::collection::vec((0.0f32..1.0, 0.0f32..1.0), 1..6)),
        0..12,
    )
}

fn build_corpus(spec: &[(u8, Vec<(f32, f32)>)]) -> Vec<Document> {
    spec.iter()
        .enumerate()
        .map(|(i, (domain, passages))| {
            let passages = passages
                .iter()
                .enumerate()
                .map(|(pos, (sim, q))| Passage::new(format!("p{pos}"), pos, *q).with_embedding(unit(*sim)))
                .collect();
            Document::new(format!("https://d{domain}.dev/{i}"), format!("Doc {i}"), "")
                .with_passages(passages)
        })
        .collect()
}

fn doc(url: &str, title: &str, text: &str) -> Document {
    Document::new(url, title, text).with_passages(vec![Passage::new(text, 0, 0.5)])
}

proptest! {
    #[test]
    fn chunks_cover_source_and_respect_size_bound(text in paragraph()) {
        let chunker = PassageChunker::new(ChunkerConfig::default());
        let passages = chunker.chunk_text(&text);
        prop_assert!(!passages.is_empty());

        let source: Vec<&str> = text.split_whitespace().collect();
        let joined: Vec<String> = passages
            .iter()
            .flat_map(|p| p.text.split_whitespace().map(str::to_string).collect::<Vec<_>>())
            .collect();
        prop_assert_eq!(joined, source);

        for p in &passages {
            prop_assert!(p.word_count <= 250, "passage of {} words", p.word_count);
            prop_assert!((0.0..=1.0).contains(&p.quality));
        }
        for pair in passages.windows(2) {
            prop_assert!(pair[0].position < pair[1].position);
        }
    }

    #[test]
    fn nested_html_chunks_cover_visible_text((html, text) in html_tree()) {
        let config = ChunkerConfig {
            max_passages: usize::MAX,
            ..ChunkerConfig::default()
        };
        let min_words = config.min_words_per_passage;
        let passages = PassageChunker::new(config).chunk_text(&format!("<html><body>{html}</body></html>"));

        let source: Vec<&str> = text.split_whitespace().collect();
        if source.len() < min_words {
            prop_assert!(passages.is_empty());
            return Ok(());
        }
        prop_assert!(!passages.is_empty());

        let joined: Vec<&str> = passages.iter().flat_map(|p| p.text.split_whitespace()).collect();
        prop_assert_eq!(joined, source);
        for p in &passages {
            prop_assert!(p.word_count <= 250, "passage of {} words", p.word_count);
        }
        for pair in passages.windows(2) {
            prop_assert!(pair[0].position < pair[1].position);
        }
    }

    #[test]
    fn lexical_scores_repeat_bit_identically(texts in prop::collection::vec(paragraph(), 1..6), query in "[a-z]{3,8} [a-z]{3,8}") {
        let corpus: Vec<Document> = texts
            .iter()
            .enumerate()
            .map(|(i, t)| doc(&format!("https://s{i}.dev"), "Title", t))
            .collect();
        let scorer = LexicalScorer::default();
        let first = scorer.search(&query, &corpus, 10, 0.0);
        let second = scorer.search(&query, &corpus, 10, 0.0);
        prop_assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(&second) {
            prop_assert_eq!(a.document_id, b.document_id);
            prop_assert_eq!(a.score.to_bits(), b.score.to_bits());
        }
    }

    #[test]
    fn rarer_term_has_no_lower_idf(n_common in 0usize..8, n_other in 0usize..4) {
        let mut corpus = vec![doc("https://site0.dev", "alpha beta", "alpha beta gamma")];
        for i in 0..n_common {
            corpus.push(doc(&format!("https://common{i}.dev"), "beta notes", "beta delta"));
        }
        for i in 0..n_other {
            corpus.push(doc(&format!("https://other{i}.dev"), "zeta notes", "zeta omega"));
        }

        let scorer = LexicalScorer::default();
        let score_of = |q: &str| {
            scorer
                .search(q, &corpus, 100, f64::NEG_INFINITY)
                .into_iter()
                .find(|h| h.document_id == corpus[0].id)
                .map(|h| h.score)
        };
        let rare = score_of("alpha");
        let common = score_of("beta");
        prop_assert!(rare.is_some() && common.is_some());
        prop_assert!(rare >= common, "alpha {:?} < beta {:?}", rare, common);
    }

    #[test]
    fn top_of_both_lists_tops_fusion(
        rest0 in id_list(),
        rest1 in id_list(),
        w0 in 0.01f64..10.0,
        w1 in 0.01f64..10.0,
    ) {
        let top = Uuid::from_u128(1_000);
        let mut l0 = vec![top];
        l0.extend(rest0);
        let mut l1 = vec![top];
        l1.extend(rest1);

        let fused = fuse(&[l0, l1], &[w0, w1], 60.0);
        prop_assert_eq!(fused[0].id, top);
    }

    #[test]
    fn both_lists_beat_one_list_at_same_rank(
        fillers in prop::collection::vec(1u128..500, 0..20),
        w0 in 0.01f64..10.0,
        w1 in 0.01f64..10.0,
    ) {
        let filler: Vec<Uuid> = fillers.into_iter().map(Uuid::from_u128).collect();
        let both = Uuid::from_u128(10_000);
        let one = Uuid::from_u128(10_001);

        let mut l0 = filler.clone();
        l0.push(both);
        let mut l1 = filler.clone();
        l1.push(both);
        let fused_both = fuse(&[l0, l1], &[w0, w1], 60.0);

        let mut m0 = filler.clone();
        m0.push(one);
        let fused_one = fuse(&[m0, filler], &[w0, w1], 60.0);

        let score = |f: &[recall_retrieval::FusedEntry], id| {
            f.iter().find(|e| e.id == id).map(|e| e.score).unwrap_or_default()
        };
        prop_assert!(score(&fused_both, both) > score(&fused_one, one));
    }

    #[test]
    fn negative_weights_fall_back_to_uniform(l0 in id_list(), l1 in id_list()) {
        let lists = [l0, l1];
        prop_assert_eq!(fuse(&lists, &[1.0, -1.0], 60.0), fuse(&lists, &[0.5, 0.5], 60.0));
    }

    #[test]
    fn diversity_caps_hold(
        spec in corpus_spec(),
        top_k in 1usize..12,
        max_per_document in 1usize..4,
        max_per_domain in 1usize..3,
        quality_weight in 0.0f32..=1.0,
        min_similarity in 0.0f32..1.0,
    ) {
        let corpus = build_corpus(&spec);
        let options = DiversityConfig {
            top_k,
            min_similarity,
            max_per_document,
            max_per_domain,
            quality_weight,
        };
        let selected = select_diverse(&[1.0, 0.0], &corpus, &options);
        prop_assert!(selected.len() <= top_k);

        let mut per_doc: HashMap<Uuid, usize> = HashMap::new();
        let mut per_domain: HashMap<String, HashSet<Uuid>> = HashMap::new();
        for rp in &selected {
            prop_assert!(rp.similarity >= min_similarity);
            *per_doc.entry(rp.document_id).or_default() += 1;
            per_domain
                .entry(recall_core::domain_of(&rp.document_url))
                .or_default()
                .insert(rp.document_id);
        }
        prop_assert!(per_doc.values().all(|&n| n <= max_per_document));
        prop_assert!(per_domain.values().all(|docs| docs.len() <= max_per_domain));

        for pair in selected.windows(2) {
            prop_assert!(pair[0].combined_score >= pair[1].combined_score);
        }
    }
}
