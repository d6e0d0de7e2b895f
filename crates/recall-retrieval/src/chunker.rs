//! Document-to-passage chunking.
//!
//! Locates the main content root of a page, walks it bottom-up collecting
//! block text, merges small siblings and splits oversized blocks at sentence
//! or paragraph breaks. Each resulting passage gets a heuristic quality score.

use std::collections::HashSet;
use std::sync::LazyLock;

use recall_core::{Document, Passage};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};
use unicode_segmentation::UnicodeSegmentation;

use crate::config::ChunkerConfig;

/// Container selectors tried before the configured list.
const SEMANTIC_ROOTS: &[&str] = &["article", "main", "[role=\"main\"]"];

/// Elements whose text is never visible.
const INVISIBLE_TAGS: &[&str] = &[
    "script", "style", "noscript", "template", "head", "svg", "iframe", "canvas", "object",
];

/// Elements that flow inside a block instead of forming one.
const INLINE_TAGS: &[&str] = &[
    "a", "abbr", "b", "bdi", "bdo", "br", "cite", "code", "data", "del", "dfn", "em", "font",
    "i", "img", "ins", "kbd", "label", "mark", "q", "s", "samp", "small", "span", "strong",
    "sub", "sup", "time", "u", "var", "wbr",
];

/// Discourse connectives that signal explanatory prose.
const CONNECTIVES: &[&str] = &[
    "however",
    "therefore",
    "because",
    "although",
    "moreover",
    "furthermore",
    "consequently",
    "thus",
    "hence",
    "nevertheless",
    "meanwhile",
    "additionally",
    "instead",
    "otherwise",
    "for example",
    "for instance",
    "in contrast",
    "as a result",
];

#[allow(clippy::expect_used)]
static PARAGRAPH_BREAK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n[ \t\r]*\n").expect("paragraph break pattern is valid"));

/// A passage under construction: normalized text plus bookkeeping for merges.
#[derive(Debug, Clone)]
struct Draft {
    text: String,
    words: usize,
    /// Already larger than the per-passage maximum; may not grow further.
    overshot: bool,
}

/// Splits documents into ordered, quality-scored passages.
///
/// Never fails: malformed or empty input yields an empty list, and the
/// caller decides whether to synthesize a fallback passage.
#[derive(Debug, Clone, Default)]
pub struct PassageChunker {
    config: ChunkerConfig,
}

impl PassageChunker {
    /// Create a chunker with the given parameters.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { config }
    }

    /// The active parameters.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Chunk a document's raw content.
    pub fn chunk(&self, document: &Document) -> Vec<Passage> {
        let passages = self.chunk_text(&document.raw_text);
        debug!(
            document_id = %document.id,
            url = %document.url,
            passages = passages.len(),
            "chunked document"
        );
        passages
    }

    /// Chunk raw HTML or plain text.
    ///
    /// Up to the passage cap, every visible word of the content root lands
    /// in exactly one passage, in document order. Content with fewer words than the per-passage
    /// minimum yields no passages.
    pub fn chunk_text(&self, raw: &str) -> Vec<Passage> {
        if raw.trim().is_empty() {
            return Vec::new();
        }

        let html = Html::parse_document(raw);
        let Some(root) = self.content_root(&html) else {
            return Vec::new();
        };

        let mut drafts = self.walk(root);
        let total_words: usize = drafts.iter().map(|d| d.words).sum();
        if total_words < self.config.min_words_per_passage.max(1) {
            return Vec::new();
        }
        drafts.truncate(self.config.max_passages);

        drafts
            .into_iter()
            .enumerate()
            .map(|(position, draft)| {
                let quality = quality_score(&draft.text);
                Passage::new(draft.text, position, quality)
            })
            .collect()
    }

    /// Pick the main-content root: semantic containers, then configured
    /// selectors, then `body` unconditionally.
    fn content_root<'a>(&self, html: &'a Html) -> Option<ElementRef<'a>> {
        let candidates = SEMANTIC_ROOTS
            .iter()
            .copied()
            .chain(self.config.content_selectors.iter().map(String::as_str));

        for raw_selector in candidates {
            let selector = match Selector::parse(raw_selector) {
                Ok(s) => s,
                Err(e) => {
                    warn!(selector = raw_selector, error = ?e, "Skipping invalid content selector");
                    continue;
                }
            };
            for element in html.select(&selector) {
                let visible = visible_text(element);
                if visible.trim().chars().count() > self.config.min_content_chars {
                    debug!(selector = raw_selector, "content root selected");
                    return Some(element);
                }
            }
        }

        let body = Selector::parse("body").ok()?;
        html.select(&body).next().or_else(|| Some(html.root_element()))
    }

    /// Bottom-up walk: returns the drafts produced by `element`'s subtree.
    ///
    /// Loose text runs become drafts in document order, interleaved with
    /// the drafts of child blocks. Drafts below the minimum word count are
    /// kept so siblings can absorb them.
    fn walk(&self, element: ElementRef<'_>) -> Vec<Draft> {
        let mut run = String::new();
        let mut drafts = Vec::new();

        for child in element.children() {
            if let Some(child_el) = ElementRef::wrap(child) {
                let tag = child_el.value().name();
                if INVISIBLE_TAGS.contains(&tag) {
                    continue;
                }
                if tag == "br" {
                    run.push('\n');
                } else if INLINE_TAGS.contains(&tag) {
                    run.push_str(&visible_text(child_el));
                } else {
                    self.flush_run(&mut run, &mut drafts);
                    drafts.extend(self.walk(child_el));
                }
            } else if let Some(text) = child.value().as_text() {
                run.push_str(text);
            }
        }
        self.flush_run(&mut run, &mut drafts);

        self.aggregate(drafts)
    }

    fn flush_run(&self, run: &mut String, drafts: &mut Vec<Draft>) {
        if run.split_whitespace().next().is_some() {
            drafts.extend(self.split_long(run));
        }
        run.clear();
    }

    fn overshoot_limit(&self) -> usize {
        let max = self.config.max_words_per_passage as f64;
        (max * self.config.overshoot_ratio).floor() as usize
    }

    /// Greedily merge adjacent sibling passages while they fit.
    ///
    /// A group may exceed the maximum once, up to the overshoot limit, to
    /// absorb a small follower; it then closes. Drafts below the minimum
    /// word count join a neighbour whenever the result stays within the
    /// overshoot limit, even one that has already overshot.
    fn aggregate(&self, drafts: Vec<Draft>) -> Vec<Draft> {
        let min = self.config.min_words_per_passage;
        let max = self.config.max_words_per_passage;
        let limit = self.overshoot_limit();
        let small_tail = limit.saturating_sub(max);

        let mut merged: Vec<Draft> = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let Some(current) = merged.last_mut() else {
                merged.push(draft);
                continue;
            };

            let combined = current.words + draft.words;
            let open = !current.overshot && !draft.overshot;
            let fits = open && combined <= max;
            let absorbs_tail = open && combined <= limit && draft.words <= small_tail;
            let under_minimum = draft.words < min || current.words < min;

            if fits || absorbs_tail || (under_minimum && combined <= limit) {
                current.text.push_str("\n\n");
                current.text.push_str(&draft.text);
                current.words = combined;
                current.overshot = combined > max;
            } else {
                merged.push(draft);
            }
        }
        merged
    }

    /// Split one block of text into pieces no larger than the maximum,
    /// except for a final remainder within the overshoot limit.
    fn split_long(&self, text: &str) -> Vec<Draft> {
        let (words, boundaries) = tokenize_with_boundaries(text);
        let total = words.len();
        let max = self.config.max_words_per_passage;
        let limit = self.overshoot_limit();

        if total <= max {
            return vec![make_draft(&words, max)];
        }

        let mut pieces = Vec::new();
        let mut pieces_left = total.div_ceil(max);
        let mut start = 0;

        while start < total {
            let remaining = total - start;
            if remaining <= max || (pieces_left <= 1 && remaining <= limit) {
                pieces.push(make_draft(&words[start..], max));
                break;
            }
            if pieces_left <= 1 {
                pieces_left = remaining.div_ceil(max).max(2);
            }

            let target = remaining.div_ceil(pieces_left).min(max);
            let cut = if self.config.prefer_boundaries {
                self.snap_to_boundary(&boundaries, start, target, max)
                    .unwrap_or(start + target)
            } else {
                start + target
            };

            pieces.push(make_draft(&words[start..cut], max));
            start = cut;
            pieces_left -= 1;
        }

        pieces
    }

    /// The break nearest `start + target` whose piece length stays within
    /// `[boundary_min_fraction * target, max]`. Earlier breaks win ties.
    fn snap_to_boundary(
        &self,
        boundaries: &[usize],
        start: usize,
        target: usize,
        max: usize,
    ) -> Option<usize> {
        let min_len = ((target as f64) * self.config.boundary_min_fraction).ceil() as usize;
        let lo = start + min_len.max(1);
        let hi = start + max;
        let ideal = start + target;

        boundaries
            .iter()
            .copied()
            .filter(|&b| b >= lo && b <= hi)
            .min_by_key(|&b| (b.abs_diff(ideal), b))
    }
}

fn make_draft(words: &[&str], max: usize) -> Draft {
    Draft {
        text: words.join(" "),
        words: words.len(),
        overshot: words.len() > max,
    }
}

/// Whitespace tokens plus the token indices where a sentence or paragraph ends.
///
/// A boundary value `b` means a cut may fall between token `b - 1` and `b`.
fn tokenize_with_boundaries(text: &str) -> (Vec<&str>, Vec<usize>) {
    let mut words = Vec::new();
    let mut boundaries = Vec::new();

    for paragraph in PARAGRAPH_BREAK.split(text) {
        for sentence in paragraph.unicode_sentences() {
            let before = words.len();
            words.extend(sentence.split_whitespace());
            if words.len() > before {
                boundaries.push(words.len());
            }
        }
    }

    boundaries.dedup();
    (words, boundaries)
}

/// Visible text of an element: everything except invisible subtrees.
pub(crate) fn visible_text(element: ElementRef<'_>) -> String {
    let mut out = String::new();
    collect_visible(element, &mut out);
    out
}

fn collect_visible(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        if let Some(child_el) = ElementRef::wrap(child) {
            let tag = child_el.value().name();
            if INVISIBLE_TAGS.contains(&tag) {
                continue;
            }
            let is_block = !INLINE_TAGS.contains(&tag);
            if is_block || tag == "br" {
                out.push(' ');
            }
            collect_visible(child_el, out);
            if is_block {
                out.push(' ');
            }
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
}

/// Visible text of a whole page with whitespace collapsed.
pub(crate) fn page_text(raw: &str) -> String {
    let html = Html::parse_document(raw);
    visible_text(html.root_element())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Heuristic passage quality in `[0, 1]`.
///
/// Base 0.5; +0.2 for 10–100 words (else +0.1 above 100); +0.1 for two or
/// more sentences; +0.1 for a discourse connective; −0.2 when fewer than 30%
/// of the words are distinct.
pub fn quality_score(text: &str) -> f32 {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect();
    let count = words.len();

    let mut score = 0.5f32;
    if (10..=100).contains(&count) {
        score += 0.2;
    } else if count > 100 {
        score += 0.1;
    }

    let sentences = text
        .unicode_sentences()
        .filter(|s| s.chars().any(char::is_alphanumeric))
        .count();
    if sentences >= 2 {
        score += 0.1;
    }

    let lowered = format!(" {} ", words.join(" "));
    if CONNECTIVES
        .iter()
        .any(|c| lowered.contains(&format!(" {c} ")))
    {
        score += 0.1;
    }

    if count > 0 {
        let unique: HashSet<&str> = words.iter().map(String::as_str).collect();
        if (unique.len() as f32) / (count as f32) < 0.3 {
            score -= 0.2;
        }
    }

    score.clamp(0.0, 1.0)
}
