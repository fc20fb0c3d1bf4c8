use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use docchat_core::chunking::Chunker;
use docchat_core::config::Settings;
use docchat_core::traits::{DocumentStore, EmbedProvider, VectorStore};
use docchat_core::types::{Chunk, ChunkStrategy, DeleteSelector, DocumentRecord, Meta, SearchFilter, VectorPoint};
use docchat_core::Error;
use docchat_vector::point_id;

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub document_id: String,
    pub chunks: usize,
    pub removed_stale: usize,
    pub strategy: Option<ChunkStrategy>,
}

/// Chunk, embed and index documents; persist their records.
pub struct Ingestor {
    chunker: Chunker,
    embedder: Arc<dyn EmbedProvider>,
    vectors: Arc<dyn VectorStore>,
    documents: Arc<dyn DocumentStore>,
    collection: String,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(settings: &Settings, embedder: Arc<dyn EmbedProvider>, vectors: Arc<dyn VectorStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self {
            chunker: Chunker::new(settings.chunking.clone()),
            embedder,
            vectors,
            documents,
            collection: settings.retrieval.collection.clone(),
            batch_size: settings.embedding.batch_size.max(1),
        }
    }

    /// Ingest extracted text. `strategy` defaults to the configured one; the
    /// page count is read from `metadata["page_count"]`.
    pub async fn ingest(&self, document_id: &str, raw_text: &str, strategy: Option<ChunkStrategy>, metadata: Meta) -> Result<IngestReport> {
        if raw_text.trim().is_empty() {
            return Err(Error::ContentUnavailable(document_id.to_string()).into());
        }
        let strategy = strategy.unwrap_or(self.chunker.settings().default_strategy);
        let mut record = DocumentRecord { id: document_id.to_string(), raw_text: raw_text.to_string(), chunks: Vec::new(), metadata };
        let chunks = self.chunker.chunk(document_id, raw_text, strategy, record.page_count());
        let removed_stale = self.index(document_id, &chunks).await?;
        record.chunks = chunks;
        let count = record.chunks.len();
        self.documents.save_document(record).await?;
        info!(document_id, chunks = count, strategy = %strategy, "ingested document");
        Ok(IngestReport { document_id: document_id.to_string(), chunks: count, removed_stale, strategy: Some(strategy) })
    }

    /// Ingest chunks built elsewhere (image captions, audio transcripts).
    /// Indices are reassigned contiguously from 0 in the given order.
    pub async fn ingest_chunks(&self, document_id: &str, mut chunks: Vec<Chunk>) -> Result<IngestReport> {
        chunks.retain(|c| !c.text.trim().is_empty());
        if chunks.is_empty() {
            return Err(Error::ContentUnavailable(document_id.to_string()).into());
        }
        for (i, c) in chunks.iter_mut().enumerate() {
            c.document_id = document_id.to_string();
            c.chunk_index = i;
        }
        let removed_stale = self.index(document_id, &chunks).await?;
        let count = chunks.len();
        self.documents.save_chunks(document_id, chunks).await?;
        info!(document_id, chunks = count, "ingested prebuilt chunks");
        Ok(IngestReport { document_id: document_id.to_string(), chunks: count, removed_stale, strategy: None })
    }

    /// Embed every chunk, then upsert, then remove points past the new end of
    /// a document that shrank. Nothing is written until all embeddings
    /// succeed. Returns the number of stale points removed.
    async fn index(&self, document_id: &str, chunks: &[Chunk]) -> Result<usize> {
        self.vectors.ensure_collection(&self.collection, self.embedder.dim()).await?;
        let previous = self.documents.document(document_id).await?.map_or(0, |d| d.chunks.len());
        let mut points = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            if vectors.len() != batch.len() {
                anyhow::bail!("embedder returned {} vectors for {} chunks", vectors.len(), batch.len());
            }
            points.extend(batch.iter().zip(vectors).map(|(c, vector)| VectorPoint { id: point_id(document_id, c.chunk_index), vector, payload: c.clone() }));
            debug!(document_id, size = batch.len(), "embedded batch");
        }
        self.vectors.upsert(&self.collection, points).await?;
        for stale in chunks.len()..previous {
            self.vectors.delete(&self.collection, DeleteSelector::Id(point_id(document_id, stale))).await?;
        }
        Ok(previous.saturating_sub(chunks.len()))
    }

    /// Remove a document's points and its stored record.
    pub async fn delete_document(&self, document_id: &str) -> Result<()> {
        self.vectors.ensure_collection(&self.collection, self.embedder.dim()).await?;
        self.vectors.delete(&self.collection, DeleteSelector::Filter(SearchFilter::for_document(document_id))).await?;
        self.documents.delete_document(document_id).await?;
        info!(document_id, "deleted document");
        Ok(())
    }
}
