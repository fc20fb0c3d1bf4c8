use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use docchat_core::config::RetrievalSettings;
use docchat_core::traits::{EmbedProvider, GenerationBackend, VectorStore};
use docchat_core::types::{Chunk, RetrievalCandidate, ScoredPoint, SearchFilter, SourceTag};
use docchat_text::KeywordIndex;

use crate::ladder::{self, LadderInput, LadderRung};
use crate::merge::{merge_sources, WeightedSource};
use crate::rerank::rerank;

/// One retrieval request for one document.
#[derive(Debug, Clone)]
pub struct RetrievalRequest<'a> {
    pub document_id: &'a str,
    pub query: &'a str,
    pub expanded_query: &'a str,
    pub top_k: usize,
    /// Structured filters for the advanced source (page range, strategy,
    /// language). The document constraint is always added.
    pub filter: Option<SearchFilter>,
}

impl<'a> RetrievalRequest<'a> {
    pub fn new(document_id: &'a str, query: &'a str, expanded_query: &'a str, top_k: usize) -> Self {
        Self { document_id, query, expanded_query, top_k, filter: None }
    }

    pub fn with_filter(mut self, filter: SearchFilter) -> Self { self.filter = Some(filter); self }
}

/// The locally held state of the document being queried.
#[derive(Debug, Clone, Copy)]
pub struct DocumentView<'a> {
    pub chunks: &'a [Chunk],
    pub raw_text: &'a str,
    pub page_count: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Retrieval {
    pub candidates: Vec<RetrievalCandidate>,
    /// Ladder rung that produced the candidates; `None` when nothing did.
    pub rung: Option<LadderRung>,
    pub failed_sources: Vec<SourceTag>,
}

pub struct HybridRetriever {
    embedder: Arc<dyn EmbedProvider>,
    store: Arc<dyn VectorStore>,
    reranker: Option<Arc<dyn GenerationBackend>>,
    settings: RetrievalSettings,
}

impl HybridRetriever {
    pub fn new(embedder: Arc<dyn EmbedProvider>, store: Arc<dyn VectorStore>, settings: RetrievalSettings) -> Self {
        Self { embedder, store, reranker: None, settings }
    }

    /// Enables reranking through `backend` when `settings.rerank` is set.
    pub fn with_reranker(mut self, backend: Arc<dyn GenerationBackend>) -> Self { self.reranker = Some(backend); self }

    pub fn settings(&self) -> &RetrievalSettings { &self.settings }

    pub async fn retrieve(&self, req: &RetrievalRequest<'_>, doc: &DocumentView<'_>) -> Retrieval {
        let pool = req.top_k.max(1) * 2;
        let semantic_filter = SearchFilter::for_document(req.document_id);
        let advanced_filter = SearchFilter { document_id: Some(req.document_id.to_string()), ..req.filter.clone().unwrap_or_default() };

        let (semantic, advanced, keyword) = futures::join!(
            isolate(SourceTag::Semantic, self.search(req.expanded_query, pool, &semantic_filter, Some(self.settings.semantic_threshold), SourceTag::Semantic)),
            isolate(SourceTag::Advanced, self.search(req.query, pool, &advanced_filter, Some(self.settings.advanced_threshold), SourceTag::Advanced)),
            isolate(SourceTag::Keyword, async { Ok(keyword_candidates(doc.chunks, req.query, pool)) }),
        );
        let failed_sources: Vec<SourceTag> = [&semantic, &advanced, &keyword]
            .into_iter()
            .filter_map(|r| match r { Err(tag) => Some(*tag), Ok(_) => None })
            .collect();

        let merged = merge_sources(vec![
            WeightedSource { tag: SourceTag::Semantic, weight: self.settings.semantic_weight, candidates: semantic.unwrap_or_default() },
            WeightedSource { tag: SourceTag::Advanced, weight: self.settings.advanced_weight, candidates: advanced.unwrap_or_default() },
            WeightedSource { tag: SourceTag::Keyword, weight: self.settings.keyword_weight, candidates: keyword.unwrap_or_default() },
        ]);
        let filtered: Vec<RetrievalCandidate> = merged.iter().filter(|c| c.final_score >= self.settings.min_relevance).cloned().collect();
        debug!(document_id = req.document_id, merged = merged.len(), filtered = filtered.len(), "merged retrieval sources");

        let relaxed = if filtered.is_empty() && merged.is_empty() {
            isolate(SourceTag::Semantic, self.search(req.query, pool, &semantic_filter, Some(self.settings.relaxed_threshold), SourceTag::Semantic))
                .await
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        let input = LadderInput {
            document_id: req.document_id,
            top_k: req.top_k.max(1),
            filtered: &filtered,
            merged: &merged,
            relaxed: &relaxed,
            chunks: doc.chunks,
            raw_text: doc.raw_text,
            page_count: doc.page_count,
            neutral_score: self.settings.neutral_score,
            raw_window_chars: self.settings.raw_window_chars,
        };
        let Some((rung, mut candidates)) = ladder::run(&input) else {
            info!(document_id = req.document_id, "no retrievable content");
            return Retrieval { candidates: Vec::new(), rung: None, failed_sources };
        };
        if rung != LadderRung::Threshold {
            info!(document_id = req.document_id, rung = ?rung, count = candidates.len(), "retrieval fell back");
        }

        if self.settings.rerank {
            if let Some(backend) = &self.reranker {
                candidates = rerank(backend.as_ref(), req.query, candidates).await;
            }
        }
        Retrieval { candidates, rung: Some(rung), failed_sources }
    }

    /// Vector search on `text`, mapped to candidates carrying the raw score.
    pub(crate) async fn search(&self, text: &str, top_k: usize, filter: &SearchFilter, threshold: Option<f32>, tag: SourceTag) -> anyhow::Result<Vec<RetrievalCandidate>> {
        let vector = self.embedder.embed(text).await?;
        let hits = self.store.search(&self.settings.collection, &vector, top_k, Some(filter), threshold).await?;
        Ok(to_candidates(hits, tag))
    }
}

fn to_candidates(hits: Vec<ScoredPoint>, tag: SourceTag) -> Vec<RetrievalCandidate> {
    hits.into_iter().map(|h| RetrievalCandidate::new(h.payload, h.score, tag)).collect()
}

fn keyword_candidates(chunks: &[Chunk], query: &str, k: usize) -> Vec<RetrievalCandidate> {
    KeywordIndex::build(chunks)
        .search(query, k)
        .into_iter()
        .map(|hit| RetrievalCandidate::new(hit.chunk.clone(), hit.score, SourceTag::Keyword))
        .collect()
}

/// A failing source yields its tag as the error; callers treat it as empty.
pub(crate) async fn isolate<F>(tag: SourceTag, fut: F) -> Result<Vec<RetrievalCandidate>, SourceTag>
where
    F: Future<Output = anyhow::Result<Vec<RetrievalCandidate>>>,
{
    match fut.await {
        Ok(c) => Ok(c),
        Err(e) => {
            warn!(source = ?tag, error = %e, "retrieval source failed, continuing without it");
            Err(tag)
        }
    }
}
