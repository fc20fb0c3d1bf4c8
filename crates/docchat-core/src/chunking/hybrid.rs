//! Merge of independent sentence and paragraph runs.

use std::collections::HashSet;

use super::window::Window;
use crate::stopwords::words;

pub(crate) const PARAGRAPH_MIN_CHARS: usize = 200;
pub(crate) const PARAGRAPH_MAX_CHARS: usize = 1500;
pub(crate) const MAX_JACCARD: f64 = 0.7;

pub fn word_set(text: &str) -> HashSet<String> { words(text).collect() }

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 { return 0.0; }
    a.intersection(b).count() as f64 / union as f64
}

/// Prefer well-sized paragraph chunks; fill in with sentence chunks that are
/// not near-duplicates of anything already chosen. Output is ordered by page.
pub(crate) fn merge(paragraphs: Vec<Window>, sentences: Vec<Window>) -> Vec<Window> {
    let mut chosen: Vec<(Window, HashSet<String>)> = paragraphs
        .into_iter()
        .filter(|w| (PARAGRAPH_MIN_CHARS..=PARAGRAPH_MAX_CHARS).contains(&w.text.chars().count()))
        .map(|w| { let set = word_set(&w.text); (w, set) })
        .collect();
    for sentence in sentences {
        let set = word_set(&sentence.text);
        if chosen.iter().all(|(_, other)| jaccard(&set, other) < MAX_JACCARD) { chosen.push((sentence, set)); }
    }
    chosen.sort_by_key(|(w, _)| w.page);
    chosen.into_iter().map(|(w, _)| w).collect()
}
