//! Chunking Engine: turns extracted text into bounded, annotated chunks.
//!
//! All strategies are total: blank input yields no chunks, and an internal
//! failure in the semantic or hybrid strategy degrades to the sentence
//! strategy instead of surfacing an error.

mod hybrid;
mod semantic;
mod split;
mod window;

use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{ChunkingSettings, WindowConfig};
use crate::types::{Chunk, ChunkStrategy};

pub use hybrid::{jaccard, word_set};
pub use semantic::topic_label;
pub use split::{split_paragraphs, split_sentences};

use window::{accumulate, Window};

#[derive(Debug, Error)]
pub(crate) enum ChunkingError {
    #[error("no segments to chunk")]
    NoSegments,
    #[error("degenerate output: {0}")]
    Degenerate(String),
}

#[derive(Debug, Clone, Default)]
pub struct Chunker {
    settings: ChunkingSettings,
}

impl Chunker {
    pub fn new(settings: ChunkingSettings) -> Self { Self { settings } }

    pub fn settings(&self) -> &ChunkingSettings { &self.settings }

    /// Chunk `text` for `document_id`. `page_count` is the document's known
    /// page count (values below 1 are treated as 1).
    pub fn chunk(&self, document_id: &str, text: &str, strategy: ChunkStrategy, page_count: u32) -> Vec<Chunk> {
        if text.trim().is_empty() {
            debug!(document_id, "blank input, no chunks");
            return Vec::new();
        }
        let attempt = match strategy {
            ChunkStrategy::Sentence => Ok(self.sentence_windows(text, self.settings.sentence, page_count)),
            ChunkStrategy::Paragraph => Ok(self.paragraph_windows(text, self.settings.paragraph, page_count)),
            ChunkStrategy::Semantic => semantic::windows(text, self.settings.semantic_max_size, self.settings.topic_terms, page_count),
            ChunkStrategy::Hybrid => self.hybrid_windows(text, page_count),
        };
        let (windows, used) = match attempt {
            Ok(w) if !w.is_empty() => (w, strategy),
            Ok(_) => self.fallback(document_id, strategy, &ChunkingError::Degenerate("empty output".into()), text, page_count),
            Err(e) => self.fallback(document_id, strategy, &e, text, page_count),
        };
        let chunks = build_chunks(document_id, windows, used);
        debug!(document_id, strategy = %used, count = chunks.len(), "chunked document");
        chunks
    }

    fn fallback(&self, document_id: &str, strategy: ChunkStrategy, error: &ChunkingError, text: &str, page_count: u32) -> (Vec<Window>, ChunkStrategy) {
        warn!(document_id, strategy = %strategy, error = %error, "chunking strategy failed, falling back to sentence");
        (self.sentence_windows(text, self.settings.sentence, page_count), ChunkStrategy::Sentence)
    }

    fn sentence_windows(&self, text: &str, config: WindowConfig, page_count: u32) -> Vec<Window> {
        let units = split::bound_units(split_sentences(text), config.max_size);
        accumulate(&units, config, page_count, " ")
    }

    fn paragraph_windows(&self, text: &str, config: WindowConfig, page_count: u32) -> Vec<Window> {
        let units = split::bound_units(split_paragraphs(text), config.max_size);
        accumulate(&units, config, page_count, "\n\n")
    }

    fn hybrid_windows(&self, text: &str, page_count: u32) -> Result<Vec<Window>, ChunkingError> {
        let sentences = self.sentence_windows(text, self.settings.hybrid_sentence, page_count);
        let paragraphs = self.paragraph_windows(text, self.settings.hybrid_paragraph, page_count);
        if sentences.is_empty() && paragraphs.is_empty() { return Err(ChunkingError::NoSegments); }
        let merged = hybrid::merge(paragraphs, sentences);
        if merged.is_empty() { return Err(ChunkingError::Degenerate("hybrid merge selected nothing".into())); }
        Ok(merged)
    }
}

fn build_chunks(document_id: &str, windows: Vec<Window>, strategy: ChunkStrategy) -> Vec<Chunk> {
    windows
        .into_iter()
        .enumerate()
        .map(|(i, w)| {
            let mut chunk = Chunk::new(document_id, i, w.page, w.text, strategy);
            chunk.topic = w.topic;
            chunk
        })
        .collect()
}
