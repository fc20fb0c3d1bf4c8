//! Escalating fallback ladder.
//!
//! Each rung is a pure function over the same input; the first rung that
//! yields a non-empty list wins. As long as the document has any textual
//! representation, some rung produces candidates.

use serde::{Deserialize, Serialize};

use docchat_core::types::{Chunk, ChunkStrategy, RetrievalCandidate, SourceTag};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LadderRung {
    /// Merged candidates that passed the relevance threshold.
    Threshold,
    /// Top merged candidates, threshold ignored.
    TopMerged,
    /// Re-issued search with a relaxed threshold.
    Relaxed,
    /// Stored chunks in document order with a neutral score.
    StoredChunks,
    /// Fixed-width windows over the raw text.
    RawText,
}

pub struct LadderInput<'a> {
    pub document_id: &'a str,
    pub top_k: usize,
    pub filtered: &'a [RetrievalCandidate],
    pub merged: &'a [RetrievalCandidate],
    pub relaxed: &'a [RetrievalCandidate],
    pub chunks: &'a [Chunk],
    pub raw_text: &'a str,
    pub page_count: u32,
    pub neutral_score: f32,
    pub raw_window_chars: usize,
}

type Rung = fn(&LadderInput<'_>) -> Vec<RetrievalCandidate>;

const LADDER: [(LadderRung, Rung); 5] = [
    (LadderRung::Threshold, threshold),
    (LadderRung::TopMerged, top_merged),
    (LadderRung::Relaxed, relaxed),
    (LadderRung::StoredChunks, stored_chunks),
    (LadderRung::RawText, raw_text),
];

pub fn run(input: &LadderInput<'_>) -> Option<(LadderRung, Vec<RetrievalCandidate>)> {
    LADDER.iter().find_map(|(rung, f)| {
        let out = f(input);
        (!out.is_empty()).then_some((*rung, out))
    })
}

fn threshold(input: &LadderInput<'_>) -> Vec<RetrievalCandidate> {
    input.filtered.iter().take(input.top_k).cloned().collect()
}

fn top_merged(input: &LadderInput<'_>) -> Vec<RetrievalCandidate> {
    input.merged.iter().take(input.top_k.min(5)).cloned().collect()
}

fn relaxed(input: &LadderInput<'_>) -> Vec<RetrievalCandidate> {
    input.relaxed.iter().take(input.top_k.min(3)).cloned().collect()
}

fn stored_chunks(input: &LadderInput<'_>) -> Vec<RetrievalCandidate> {
    input
        .chunks
        .iter()
        .filter(|c| !c.text.trim().is_empty())
        .take(input.top_k.min(5))
        .map(|c| RetrievalCandidate::new(c.clone(), input.neutral_score, SourceTag::Fallback))
        .collect()
}

fn raw_text(input: &LadderInput<'_>) -> Vec<RetrievalCandidate> {
    let total = input.raw_text.chars().count().max(1);
    let pages = input.page_count.max(1) as usize;
    raw_windows(input.raw_text, input.raw_window_chars)
        .into_iter()
        .take(input.top_k.min(5))
        .enumerate()
        .map(|(i, (offset, text))| {
            let page = (1 + offset * pages / total).min(pages) as u32;
            let chunk = Chunk::new(input.document_id, i, page, text, ChunkStrategy::Paragraph);
            RetrievalCandidate::new(chunk, input.neutral_score, SourceTag::Fallback)
        })
        .collect()
}

/// Split into windows of at most `width` chars, breaking at whitespace when
/// one exists in the back half of the window. Returns `(char_offset, text)`.
pub fn raw_windows(text: &str, width: usize) -> Vec<(usize, String)> {
    let width = width.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let mut end = (start + width).min(chars.len());
        if end < chars.len() {
            if let Some(ws) = chars[start + width / 2..end].iter().rposition(|c| c.is_whitespace()) {
                end = start + width / 2 + ws + 1;
            }
        }
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();
        if !trimmed.is_empty() { out.push((start, trimmed.to_string())); }
        start = end;
    }
    out
}
