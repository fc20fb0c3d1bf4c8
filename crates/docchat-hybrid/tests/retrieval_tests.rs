use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use docchat_core::config::{MultimodalSettings, RetrievalSettings};
use docchat_core::traits::{EmbedProvider, FragmentStream, GenerationBackend, VectorStore};
use docchat_core::types::{
    Chunk, ChunkStrategy, ConversationTurn, CrossModalLink, DeleteSelector, Dimensions, GenerateOptions, LinkKind, Modality, ScoredPoint, SearchFilter,
    SourceTag, TimeRange, VectorPoint,
};
use docchat_core::GenerationError;
use docchat_embed::HashEmbedder;
use docchat_hybrid::{analyze, collect_links, DocumentView, HybridRetriever, LadderRung, MultimodalRetriever, RetrievalRequest};
use docchat_vector::{point_id, InMemoryVectorStore};

type Responder = Box<dyn Fn(Option<f32>, &SearchFilter) -> anyhow::Result<Vec<ScoredPoint>> + Send + Sync>;

/// Vector store answering from a closure over `(threshold, filter)`.
struct ScriptedStore {
    respond: Responder,
    thresholds: Mutex<Vec<Option<f32>>>,
}

impl ScriptedStore {
    fn new(respond: impl Fn(Option<f32>, &SearchFilter) -> anyhow::Result<Vec<ScoredPoint>> + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self { respond: Box::new(respond), thresholds: Mutex::new(Vec::new()) })
    }

    fn calls(&self) -> Vec<Option<f32>> { self.thresholds.lock().unwrap().clone() }
}

#[async_trait]
impl VectorStore for ScriptedStore {
    async fn ensure_collection(&self, _collection: &str, _dim: usize) -> anyhow::Result<()> { Ok(()) }
    async fn search(&self, _c: &str, _v: &[f32], _k: usize, filter: Option<&SearchFilter>, threshold: Option<f32>) -> anyhow::Result<Vec<ScoredPoint>> {
        self.thresholds.lock().unwrap().push(threshold);
        (self.respond)(threshold, filter.unwrap_or(&SearchFilter::default()))
    }
    async fn upsert(&self, _c: &str, _p: Vec<VectorPoint>) -> anyhow::Result<()> { Ok(()) }
    async fn delete(&self, _c: &str, _s: DeleteSelector) -> anyhow::Result<()> { Ok(()) }
}

fn chunk(idx: usize, page: u32, text: &str) -> Chunk { Chunk::new("doc", idx, page, text, ChunkStrategy::Sentence) }

fn hit(c: &Chunk, score: f32) -> ScoredPoint { ScoredPoint { id: point_id(&c.document_id, c.chunk_index), score, payload: c.clone() } }

/// The threshold the semantic source and the multimodal passes search with.
fn semantic(threshold: Option<f32>) -> bool { threshold == Some(RetrievalSettings::default().semantic_threshold) }

fn retriever(store: Arc<dyn VectorStore>) -> HybridRetriever {
    HybridRetriever::new(Arc::new(HashEmbedder::new(32)), store, RetrievalSettings::default())
}

fn stored_chunks() -> Vec<Chunk> {
    vec![
        chunk(0, 1, "Check the coolant reservoir every morning."),
        chunk(1, 1, "The filter membrane must be replaced yearly."),
        chunk(2, 2, "Battery cells should stay above freezing."),
        chunk(3, 2, "Antenna masts need guy wires in storms."),
        chunk(4, 3, "Seed storage requires dry cool rooms."),
    ]
}

#[tokio::test]
async fn agreeing_sources_average_their_weighted_scores() {
    let target = chunk(3, 2, "Pump pressure readings drift in cold weather.");
    let t = target.clone();
    let store = ScriptedStore::new(move |threshold, _| {
        Ok(match threshold {
            x if semantic(x) => vec![hit(&t, 0.4)],
            Some(x) if (x - 0.01).abs() < 1e-6 => vec![hit(&t, 0.5)],
            _ => vec![],
        })
    });
    let r = retriever(store.clone());
    let chunks = vec![target];
    let doc = DocumentView { chunks: &chunks, raw_text: "", page_count: 2 };
    let out = r.retrieve(&RetrievalRequest::new("doc", "zyx", "zyx expanded", 5), &doc).await;
    assert_eq!(out.rung, Some(LadderRung::Threshold));
    assert_eq!(out.candidates.len(), 1);
    let c = &out.candidates[0];
    assert_eq!(c.source, SourceTag::Hybrid);
    assert!((c.final_score - 0.295).abs() < 1e-6, "got {}", c.final_score);
    assert_eq!(store.calls().len(), 2, "no relaxed search when merged is non-empty");
}

#[tokio::test]
async fn no_matches_fall_back_to_stored_chunks_with_neutral_score() {
    let store = Arc::new(InMemoryVectorStore::new());
    store.ensure_collection("document_chunks", 32).await.unwrap();
    let r = retriever(store);
    let chunks = stored_chunks();
    let doc = DocumentView { chunks: &chunks, raw_text: "", page_count: 3 };
    let out = r.retrieve(&RetrievalRequest::new("doc", "engine status", "engine status", 5), &doc).await;
    assert_eq!(out.rung, Some(LadderRung::StoredChunks));
    assert_eq!(out.candidates.len(), 5);
    for (i, c) in out.candidates.iter().enumerate() {
        assert_eq!(c.chunk.chunk_index, i);
        assert_eq!(c.source, SourceTag::Fallback);
        assert_eq!(c.final_score, 0.5);
    }
}

#[tokio::test]
async fn failing_vector_store_leaves_keyword_candidates() {
    let store = ScriptedStore::new(|_, _| Err(anyhow::anyhow!("vector service down")));
    let r = retriever(store);
    let mut chunks = stored_chunks();
    chunks.push(chunk(5, 3, "Pump pressure pump pressure gauge calibration."));
    let doc = DocumentView { chunks: &chunks, raw_text: "", page_count: 3 };
    let out = r.retrieve(&RetrievalRequest::new("doc", "pump pressure", "pump pressure", 5), &doc).await;
    assert_eq!(out.failed_sources, vec![SourceTag::Semantic, SourceTag::Advanced]);
    assert!(!out.candidates.is_empty());
    assert_eq!(out.candidates[0].chunk.chunk_index, 5);
    assert!(out.candidates.iter().all(|c| c.source == SourceTag::Keyword));
}

#[tokio::test]
async fn weak_matches_take_the_top_of_merged() {
    let chunks = stored_chunks();
    let hits: Vec<ScoredPoint> = chunks.iter().map(|c| hit(c, 0.05)).collect();
    let store = ScriptedStore::new(move |threshold, _| Ok(if semantic(threshold) { hits.clone() } else { vec![] }));
    let r = retriever(store);
    let doc = DocumentView { chunks: &chunks, raw_text: "", page_count: 3 };
    let out = r.retrieve(&RetrievalRequest::new("doc", "nothing", "nothing", 8), &doc).await;
    assert_eq!(out.rung, Some(LadderRung::TopMerged));
    assert_eq!(out.candidates.len(), 5);
    assert!(out.candidates.iter().all(|c| c.final_score < 0.1));
}

#[tokio::test]
async fn relaxed_search_is_issued_only_when_everything_else_is_empty() {
    let chunks = stored_chunks();
    let relaxed_hits: Vec<ScoredPoint> = chunks.iter().map(|c| hit(c, 0.02)).collect();
    let store = ScriptedStore::new(move |threshold, filter| {
        assert_eq!(filter.document_id.as_deref(), Some("doc"));
        Ok(if threshold == Some(0.0) { relaxed_hits.clone() } else { vec![] })
    });
    let r = retriever(store.clone());
    let doc = DocumentView { chunks: &chunks, raw_text: "", page_count: 3 };
    let out = r.retrieve(&RetrievalRequest::new("doc", "nothing", "nothing", 5), &doc).await;
    assert_eq!(out.rung, Some(LadderRung::Relaxed));
    assert_eq!(out.candidates.len(), 3);
    assert_eq!(store.calls(), vec![Some(0.05), Some(0.01), Some(0.0)]);
}

/// Embeds every text to the same vector.
struct FixedEmbedder(Vec<f32>);

#[async_trait]
impl EmbedProvider for FixedEmbedder {
    fn embedder_id(&self) -> &str { "fixed" }
    fn dim(&self) -> usize { self.0.len() }
    async fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> { Ok(texts.iter().map(|_| self.0.clone()).collect()) }
}

#[tokio::test]
async fn near_orthogonal_matches_reach_the_relaxed_rung_on_a_real_store() {
    let store = Arc::new(InMemoryVectorStore::new());
    store.ensure_collection("document_chunks", 2).await.unwrap();
    let chunks = stored_chunks();
    // cosine against [1, 0] is about 0.005: under the semantic and advanced floors, over the relaxed one
    let points = chunks.iter().map(|c| VectorPoint { id: point_id("doc", c.chunk_index), vector: vec![0.005, 1.0], payload: c.clone() }).collect();
    store.upsert("document_chunks", points).await.unwrap();

    let r = HybridRetriever::new(Arc::new(FixedEmbedder(vec![1.0, 0.0])), store, RetrievalSettings::default());
    let doc = DocumentView { chunks: &chunks, raw_text: "", page_count: 3 };
    let out = r.retrieve(&RetrievalRequest::new("doc", "zzz", "zzz", 5), &doc).await;
    assert_eq!(out.rung, Some(LadderRung::Relaxed));
    assert_eq!(out.candidates.len(), 3);
    assert!(out.candidates.iter().all(|c| c.raw_score > 0.0 && c.raw_score < 0.01));
}

#[tokio::test]
async fn raw_text_is_the_last_resort_and_nothing_yields_none() {
    let store = ScriptedStore::new(|_, _| Ok(vec![]));
    let r = retriever(store);
    let raw = "Unchunked manual text. ".repeat(100);
    let out = r.retrieve(&RetrievalRequest::new("doc", "q", "q", 5), &DocumentView { chunks: &[], raw_text: &raw, page_count: 1 }).await;
    assert_eq!(out.rung, Some(LadderRung::RawText));
    assert_eq!(out.candidates.len(), 3);
    assert!(out.candidates.iter().all(|c| c.chunk.char_count <= 1000));

    let out = r.retrieve(&RetrievalRequest::new("doc", "q", "q", 5), &DocumentView { chunks: &[], raw_text: " ", page_count: 1 }).await;
    assert_eq!(out.rung, None);
    assert!(out.candidates.is_empty());
}

#[tokio::test]
async fn semantic_search_over_real_store_ranks_the_matching_chunk_first() {
    let embedder = Arc::new(HashEmbedder::new(256));
    let store = Arc::new(InMemoryVectorStore::new());
    store.ensure_collection("document_chunks", 256).await.unwrap();
    let chunks = stored_chunks();
    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed_batch(&texts).await.unwrap();
    let points = chunks.iter().zip(vectors).map(|(c, v)| VectorPoint { id: point_id("doc", c.chunk_index), vector: v, payload: c.clone() }).collect();
    store.upsert("document_chunks", points).await.unwrap();

    let r = HybridRetriever::new(embedder, store, RetrievalSettings::default());
    let doc = DocumentView { chunks: &chunks, raw_text: "", page_count: 3 };
    let out = r.retrieve(&RetrievalRequest::new("doc", "battery cells freezing", "battery cells freezing", 3), &doc).await;
    assert_eq!(out.rung, Some(LadderRung::Threshold));
    assert_eq!(out.candidates[0].chunk.chunk_index, 2);
    assert_eq!(out.candidates[0].source, SourceTag::Hybrid);
    let keys: std::collections::HashSet<_> = out.candidates.iter().map(|c| c.chunk.merge_key()).collect();
    assert_eq!(keys.len(), out.candidates.len());
}

/// Scores every passage 1.0 except those containing "fail", which error.
struct Grader;

#[async_trait]
impl GenerationBackend for Grader {
    fn engine_id(&self) -> &str { "grader" }
    async fn generate(&self, messages: &[ConversationTurn], _o: &GenerateOptions) -> Result<String, GenerationError> {
        let prompt = &messages[messages.len() - 1].content;
        if prompt.contains("fail") { Err(GenerationError::Request { message: "grader offline".into() }) } else { Ok("{\"score\": 1.0}".into()) }
    }
    async fn generate_streaming(&self, _m: &[ConversationTurn], _o: &GenerateOptions) -> Result<FragmentStream, GenerationError> {
        Err(GenerationError::Request { message: "unsupported".into() })
    }
}

#[tokio::test]
async fn one_failed_rerank_keeps_that_candidates_score() {
    let good = chunk(0, 1, "good passage");
    let bad = chunk(1, 1, "this one will fail");
    let (g, b) = (good.clone(), bad.clone());
    let store = ScriptedStore::new(move |threshold, _| Ok(if semantic(threshold) { vec![hit(&b, 0.9), hit(&g, 0.5)] } else { vec![] }));
    let settings = RetrievalSettings { rerank: true, ..RetrievalSettings::default() };
    let r = HybridRetriever::new(Arc::new(HashEmbedder::new(32)), store, settings).with_reranker(Arc::new(Grader));
    let chunks = vec![good, bad];
    let out = r.retrieve(&RetrievalRequest::new("doc", "q", "q", 5), &DocumentView { chunks: &chunks, raw_text: "", page_count: 1 }).await;
    assert_eq!(out.candidates.len(), 2);
    let good = out.candidates.iter().find(|c| c.chunk.chunk_index == 0).unwrap();
    let bad = out.candidates.iter().find(|c| c.chunk.chunk_index == 1).unwrap();
    assert!((good.final_score - (0.5 * 0.6 + 1.0) / 2.0).abs() < 1e-6);
    assert_eq!(good.rerank_score, Some(1.0));
    assert!((bad.final_score - 0.9 * 0.6).abs() < 1e-6);
    assert_eq!(bad.rerank_score, None);
    assert_eq!(out.candidates[0].chunk.chunk_index, 0, "reranked list is re-sorted");
}

#[tokio::test]
async fn modality_pass_boosts_preferred_images_and_dedups() {
    let text = chunk(0, 1, "The pump sits behind the north wall.");
    let mut image = chunk(1, 1, "Diagram of the pump assembly with valves labelled.").with_modality(Modality::Image);
    image.dimensions = Some(Dimensions { width: 640, height: 480 });
    image.links.push(CrossModalLink { kind: LinkKind::Reference, source_modality: Modality::Image, target_modality: Modality::Text, extents: Default::default(), description: "figure 1".into() });
    let (t, i) = (text.clone(), image.clone());
    let store = ScriptedStore::new(move |threshold, filter| {
        if !semantic(threshold) { return Ok(vec![]); }
        Ok(match filter.modality {
            Some(Modality::Image) => vec![hit(&i, 0.8)],
            _ => vec![hit(&t, 0.7), hit(&i, 0.6)],
        })
    });
    let hybrid = retriever(store);
    let mm = MultimodalRetriever::new(&hybrid, MultimodalSettings::default());
    let chunks = vec![text, image];
    let doc = DocumentView { chunks: &chunks, raw_text: "", page_count: 1 };
    let out = mm.retrieve(&RetrievalRequest::new("doc", "show the pump diagram", "show the pump diagram", 5), &doc).await;

    assert_eq!(out.analysis.preferred_modalities, vec![Modality::Image]);
    assert_eq!(out.candidates.len(), 2, "the image seen by three passes appears once");
    let img = out.candidates.iter().find(|c| c.chunk.modality == Modality::Image).unwrap();
    // the modality pass is weighted like the semantic source: 0.8 * 0.6 beats 0.6 * 0.6 from the primary pass
    assert!((img.final_score - 0.8 * 0.6 * 0.9 * 1.2 * 1.15).abs() < 1e-5, "got {}", img.final_score);
    let txt = out.candidates.iter().find(|c| c.chunk.modality == Modality::Text).unwrap();
    assert!((txt.final_score - 0.7 * 0.6 * 1.15).abs() < 1e-5, "got {}", txt.final_score);
    assert_eq!(out.candidates[0].chunk.modality, Modality::Image);
    assert_eq!(out.links.len(), 1);
}

#[test]
fn multipliers_compose() {
    let store = ScriptedStore::new(|_, _| Ok(vec![]));
    let hybrid = retriever(store);
    let mm = MultimodalRetriever::new(&hybrid, MultimodalSettings::default());
    let mut audio = chunk(0, 1, "we said the pump restarts").with_modality(Modality::Audio);
    audio.time_range = Some(TimeRange { start_secs: 5.0, end_secs: 70.0 });
    let c = docchat_core::types::RetrievalCandidate::new(audio, 1.0, SourceTag::Modality);
    let a = analyze("what did the speaker say at 1:05");
    assert!((mm.multiplier(&c, &a, false) - 0.8 * 1.2 * 1.1).abs() < 1e-6);
    assert!((mm.multiplier(&c, &analyze("pump"), true) - 0.8 * 1.15).abs() < 1e-6);
}

#[test]
fn links_are_deduplicated_across_chunks() {
    let link = CrossModalLink { kind: LinkKind::Temporal, source_modality: Modality::Audio, target_modality: Modality::Image, extents: Default::default(), description: "same moment".into() };
    let mut a = chunk(0, 1, "a");
    a.links.push(link.clone());
    let mut b = chunk(1, 1, "b");
    b.links.push(link.clone());
    let cands: Vec<_> = [a, b].into_iter().map(|c| docchat_core::types::RetrievalCandidate::new(c, 1.0, SourceTag::Semantic)).collect();
    assert_eq!(collect_links(&cands), vec![link]);
}
