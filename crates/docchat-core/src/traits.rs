use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::GenerationError;
use crate::types::{ChatRecord, Chunk, ConversationTurn, DeleteSelector, DocumentRecord, GenerateOptions, ScoredPoint, SearchFilter, VectorPoint};

/// Raw text fragments as they arrive from a streaming backend.
pub type FragmentStream = BoxStream<'static, Result<String, GenerationError>>;

#[async_trait]
pub trait EmbedProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g., `hash:xxh64:d384`).
    fn embedder_id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop().ok_or_else(|| anyhow::anyhow!("embedder returned no vector"))
    }
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Provision a collection with a fixed dimensionality and cosine distance.
    async fn ensure_collection(&self, collection: &str, dim: usize) -> anyhow::Result<()>;
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
        score_threshold: Option<f32>,
    ) -> anyhow::Result<Vec<ScoredPoint>>;
    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> anyhow::Result<()>;
    async fn delete(&self, collection: &str, selector: DeleteSelector) -> anyhow::Result<()>;
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Identity recorded as `engine_used` in results.
    fn engine_id(&self) -> &str;
    async fn generate(&self, messages: &[ConversationTurn], options: &GenerateOptions) -> Result<String, GenerationError>;
    async fn generate_streaming(&self, messages: &[ConversationTurn], options: &GenerateOptions) -> Result<FragmentStream, GenerationError>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn document(&self, id: &str) -> anyhow::Result<Option<DocumentRecord>>;
    async fn save_document(&self, document: DocumentRecord) -> anyhow::Result<()>;
    async fn save_chunks(&self, document_id: &str, chunks: Vec<Chunk>) -> anyhow::Result<()>;
    async fn delete_document(&self, id: &str) -> anyhow::Result<()>;
    async fn chat(&self, id: &str) -> anyhow::Result<Option<ChatRecord>>;
    async fn save_chat(&self, chat: ChatRecord) -> anyhow::Result<()>;
    async fn append_turns(&self, chat_id: &str, turns: Vec<ConversationTurn>) -> anyhow::Result<()>;
}
