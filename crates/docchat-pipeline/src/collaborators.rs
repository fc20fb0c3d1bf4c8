use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use docchat_core::config::{resolve_with_base, Settings};
use docchat_core::traits::{DocumentStore, EmbedProvider, GenerationBackend, VectorStore};
use docchat_generate::{HttpBackend, Orchestrator};

use crate::chat::ChatPipeline;
use crate::ingest::Ingestor;
use crate::store::JsonFileStore;

/// Long-lived services shared by ingestion and chat. Built once, handed to
/// the pipelines, and closed explicitly on shutdown.
pub struct Collaborators {
    pub settings: Settings,
    pub embedder: Arc<dyn EmbedProvider>,
    pub vectors: Arc<dyn VectorStore>,
    pub documents: Arc<dyn DocumentStore>,
    pub primary: Arc<dyn GenerationBackend>,
    pub secondary: Arc<dyn GenerationBackend>,
}

impl Collaborators {
    /// Construct every collaborator from `settings`; relative paths resolve
    /// against `base` (usually the config directory).
    pub async fn init(settings: Settings, base: &Path) -> Result<Self> {
        let embedder = docchat_embed::provider_from_settings(&settings.embedding)?;
        let vectors = docchat_vector::store_from_settings(&settings.vector, base).await?;
        let documents: Arc<dyn DocumentStore> = Arc::new(JsonFileStore::open(resolve_with_base(base, &settings.store.path)).await?);
        let primary: Arc<dyn GenerationBackend> = Arc::new(HttpBackend::from_settings(&settings.generation.primary)?);
        let secondary: Arc<dyn GenerationBackend> = Arc::new(HttpBackend::from_settings(&settings.generation.secondary)?);
        vectors.ensure_collection(&settings.retrieval.collection, embedder.dim()).await?;
        info!(embedder = embedder.embedder_id(), primary = primary.engine_id(), secondary = secondary.engine_id(), "collaborators ready");
        Ok(Self { settings, embedder, vectors, documents, primary, secondary })
    }

    pub fn from_parts(
        settings: Settings,
        embedder: Arc<dyn EmbedProvider>,
        vectors: Arc<dyn VectorStore>,
        documents: Arc<dyn DocumentStore>,
        primary: Arc<dyn GenerationBackend>,
        secondary: Arc<dyn GenerationBackend>,
    ) -> Self {
        Self { settings, embedder, vectors, documents, primary, secondary }
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::from_settings(self.primary.clone(), self.secondary.clone(), &self.settings.generation))
    }

    pub fn ingestor(&self) -> Ingestor {
        Ingestor::new(&self.settings, self.embedder.clone(), self.vectors.clone(), self.documents.clone())
    }

    pub fn chat_pipeline(&self) -> ChatPipeline {
        ChatPipeline::new(&self.settings, self.embedder.clone(), self.vectors.clone(), self.documents.clone(), self.orchestrator())
    }

    /// Release the collaborators. Pipelines built from them keep their own
    /// handles until they are dropped too.
    pub fn close(self) {
        let Self { embedder, vectors, documents, primary, secondary, .. } = self;
        info!(embedder = embedder.embedder_id(), "closing collaborators");
        drop((embedder, vectors, documents, primary, secondary));
    }
}
