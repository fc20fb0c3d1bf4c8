use std::collections::HashMap;

use tracing::debug;

use docchat_core::types::Chunk;

use crate::analyzer::{build_analyzer, query_terms, tokenize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeywordHit<'a> {
    pub chunk: &'a Chunk,
    pub score: f32,
}

/// Term statistics for one document's chunk set. IDF is computed over this
/// document only.
pub struct KeywordIndex<'a> {
    chunks: &'a [Chunk],
    term_freqs: Vec<HashMap<String, usize>>,
    doc_freq: HashMap<String, usize>,
}

impl<'a> KeywordIndex<'a> {
    pub fn build(chunks: &'a [Chunk]) -> Self {
        let mut analyzer = build_analyzer();
        let mut term_freqs = Vec::with_capacity(chunks.len());
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for chunk in chunks {
            let mut tf: HashMap<String, usize> = HashMap::new();
            for token in tokenize(&mut analyzer, &chunk.text) { *tf.entry(token).or_insert(0) += 1; }
            for term in tf.keys() { *doc_freq.entry(term.clone()).or_insert(0) += 1; }
            term_freqs.push(tf);
        }
        Self { chunks, term_freqs, doc_freq }
    }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    /// `score = Σ tf(term, chunk) × ln(N / (df(term) + 1)) / |terms|` over query
    /// terms longer than two characters. Only positive scores are returned,
    /// best first.
    pub fn search(&self, query: &str, k: usize) -> Vec<KeywordHit<'a>> {
        let mut analyzer = build_analyzer();
        let terms = query_terms(&mut analyzer, query);
        if terms.is_empty() || self.chunks.is_empty() { return Vec::new(); }
        let total = self.chunks.len() as f32;
        let idf: Vec<f32> = terms.iter().map(|t| (total / (*self.doc_freq.get(t).unwrap_or(&0) as f32 + 1.0)).ln()).collect();

        let mut hits: Vec<KeywordHit<'a>> = self
            .chunks
            .iter()
            .zip(&self.term_freqs)
            .filter_map(|(chunk, tf)| {
                let sum: f32 = terms.iter().zip(&idf).map(|(t, w)| *tf.get(t).unwrap_or(&0) as f32 * w).sum();
                let score = sum / terms.len() as f32;
                (score > 0.0).then_some(KeywordHit { chunk, score })
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        debug!(terms = terms.len(), hits = hits.len(), "keyword search");
        hits
    }
}
