//! Domain types shared by the chunking, retrieval and generation crates.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub type DocumentId = String;
pub type Meta = BTreeMap<String, serde_json::Value>;

/// Content-type classification of a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    #[default]
    Text,
    Image,
    Audio,
}

impl Modality {
    pub const ALL: [Modality; 3] = [Modality::Text, Modality::Image, Modality::Audio];

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Text => "text",
            Modality::Image => "image",
            Modality::Audio => "audio",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Strategy that produced a chunk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStrategy {
    Sentence,
    Paragraph,
    Semantic,
    #[default]
    Hybrid,
}

impl ChunkStrategy {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkStrategy::Sentence => "sentence",
            ChunkStrategy::Paragraph => "paragraph",
            ChunkStrategy::Semantic => "semantic",
            ChunkStrategy::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for ChunkStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ChunkStrategy {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sentence" => Ok(ChunkStrategy::Sentence),
            "paragraph" => Ok(ChunkStrategy::Paragraph),
            "semantic" => Ok(ChunkStrategy::Semantic),
            "hybrid" => Ok(ChunkStrategy::Hybrid),
            other => Err(crate::Error::InvalidConfig(format!("unknown chunking strategy '{}'", other))),
        }
    }
}

/// Time extent of an audio (or time-aligned) chunk, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Pixel dimensions of an image chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkKind {
    Temporal,
    Spatial,
    Semantic,
    Reference,
}

/// Explicit relation between chunks of different modalities. Attached at
/// ingestion and passed through retrieval untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossModalLink {
    #[serde(rename = "type")]
    pub kind: LinkKind,
    pub source_modality: Modality,
    pub target_modality: Modality,
    #[serde(default)]
    pub extents: BTreeMap<String, String>,
    pub description: String,
}

/// A bounded span of document text with its annotations.
///
/// Identity is `(document_id, chunk_index)`; indices are contiguous from 0
/// within a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub document_id: DocumentId,
    pub chunk_index: usize,
    pub page_number: u32,
    pub text: String,
    pub strategy: ChunkStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default)]
    pub modality: Modality,
    pub word_count: usize,
    pub char_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<TimeRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<Dimensions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<CrossModalLink>,
}

impl Chunk {
    pub fn new(document_id: impl Into<String>, chunk_index: usize, page_number: u32, text: impl Into<String>, strategy: ChunkStrategy) -> Self {
        let text = text.into();
        Self {
            document_id: document_id.into(),
            chunk_index,
            page_number,
            word_count: text.split_whitespace().count(),
            char_count: text.chars().count(),
            text,
            strategy,
            topic: None,
            modality: Modality::Text,
            language: None,
            time_range: None,
            dimensions: None,
            links: Vec::new(),
        }
    }

    pub fn with_modality(mut self, modality: Modality) -> Self { self.modality = modality; self }

    /// Merge key used when combining retrieval sources.
    pub fn merge_key(&self) -> (usize, u32) { (self.chunk_index, self.page_number) }
}

/// Which retrieval source produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Semantic,
    Advanced,
    Keyword,
    Modality,
    Fallback,
    Hybrid,
}

/// A chunk scored for one request. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalCandidate {
    pub chunk: Chunk,
    pub raw_score: f32,
    pub source: SourceTag,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rerank_score: Option<f32>,
    pub final_score: f32,
}

impl RetrievalCandidate {
    pub fn new(chunk: Chunk, raw_score: f32, source: SourceTag) -> Self {
        Self { chunk, raw_score, source, rerank_score: None, final_score: raw_score }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One message of a conversation, also used as the message unit sent to
/// generation backends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Meta>,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self { Self { role, content: content.into(), metadata: None } }
    pub fn system(content: impl Into<String>) -> Self { Self::new(Role::System, content) }
    pub fn user(content: impl Into<String>) -> Self { Self::new(Role::User, content) }
    pub fn assistant(content: impl Into<String>) -> Self { Self::new(Role::Assistant, content) }
}

/// Chunk reference cited by an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_index: usize,
    pub page_number: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub content: String,
    pub tokens_used: usize,
    pub engine_used: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub thinking_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub metadata: Meta,
}

/// Per-call generation options forwarded to a backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// Document state exposed by the document store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: DocumentId,
    #[serde(default)]
    pub raw_text: String,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
    #[serde(default)]
    pub metadata: Meta,
}

impl DocumentRecord {
    /// Known page count from metadata (`page_count`), defaulting to 1.
    pub fn page_count(&self) -> u32 {
        self.metadata.get("page_count").and_then(serde_json::Value::as_u64).map_or(1, |n| n.clamp(1, u64::from(u32::MAX)) as u32)
    }

    pub fn has_text(&self) -> bool { !self.raw_text.trim().is_empty() || self.chunks.iter().any(|c| !c.text.trim().is_empty()) }
}

/// Chat state exposed by the chat store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub document_id: DocumentId,
    #[serde(default)]
    pub messages: Vec<ConversationTurn>,
}

/// Structured filter for vector search. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchFilter {
    pub document_id: Option<DocumentId>,
    pub page_range: Option<(u32, u32)>,
    pub strategy: Option<ChunkStrategy>,
    pub language: Option<String>,
    pub modality: Option<Modality>,
}

impl SearchFilter {
    pub fn for_document(document_id: impl Into<String>) -> Self { Self { document_id: Some(document_id.into()), ..Self::default() } }

    pub fn with_modality(mut self, modality: Modality) -> Self { self.modality = Some(modality); self }

    pub fn matches(&self, chunk: &Chunk) -> bool {
        if self.document_id.as_ref().is_some_and(|d| *d != chunk.document_id) { return false; }
        if self.page_range.is_some_and(|(lo, hi)| chunk.page_number < lo || chunk.page_number > hi) { return false; }
        if self.strategy.is_some_and(|s| s != chunk.strategy) { return false; }
        if self.language.as_ref().is_some_and(|l| chunk.language.as_deref() != Some(l.as_str())) { return false; }
        if self.modality.is_some_and(|m| m != chunk.modality) { return false; }
        true
    }
}

/// A point written to the vector search service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: Chunk,
}

/// A search hit returned by the vector search service; higher score is better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    pub payload: Chunk,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DeleteSelector {
    Id(String),
    Filter(SearchFilter),
}

/// Estimated token count: a quarter of the character count, rounded up.
pub fn estimate_tokens(text: &str) -> usize { text.chars().count().div_ceil(4) }
