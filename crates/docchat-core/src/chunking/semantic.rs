//! Topic-labelled paragraph merging.

use std::collections::HashMap;

use super::split::{bound_units, split_paragraphs};
use super::window::{PageEstimator, Window};
use super::ChunkingError;
use crate::stopwords::content_terms;

/// Coarse topic label: the `top_n` most frequent non-stopword terms (ties
/// broken by first occurrence), sorted so that label equality ignores order.
pub fn topic_label(text: &str, top_n: usize) -> Option<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    for (pos, term) in content_terms(text).into_iter().enumerate() {
        counts.entry(term).or_insert((0, pos)).0 += 1;
    }
    if counts.is_empty() { return None; }
    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    let mut top: Vec<String> = ranked.into_iter().take(top_n.max(1)).map(|(t, _)| t).collect();
    top.sort();
    Some(top.join(","))
}

struct Group {
    text: String,
    chars: usize,
    label: Option<String>,
    page: u32,
}

pub(crate) fn windows(text: &str, max_size: usize, top_n: usize, page_count: u32) -> Result<Vec<Window>, ChunkingError> {
    let segments = bound_units(split_paragraphs(text), max_size);
    if segments.is_empty() { return Err(ChunkingError::NoSegments); }

    let mut pages = PageEstimator::new(segments.len(), page_count);
    let mut out = Vec::new();
    let mut group: Option<Group> = None;
    for segment in segments {
        let page = pages.next_page();
        let label = topic_label(&segment, top_n);
        let seg_chars = segment.chars().count();
        match group.as_mut() {
            Some(g) if (g.label.is_none() || g.label == label) && g.chars + 2 + seg_chars <= max_size => {
                g.text.push_str("\n\n");
                g.text.push_str(&segment);
                g.chars += 2 + seg_chars;
                if g.label.is_none() { g.label = label; }
            }
            _ => {
                if let Some(done) = group.take() { out.push(Window { text: done.text, page: done.page, topic: done.label }); }
                group = Some(Group { text: segment, chars: seg_chars, label, page });
            }
        }
    }
    if let Some(done) = group { out.push(Window { text: done.text, page: done.page, topic: done.label }); }
    if out.is_empty() { return Err(ChunkingError::Degenerate("semantic merge produced no segments".into())); }
    Ok(out)
}
