use std::collections::HashMap;

use futures::future::join_all;
use tracing::debug;

use docchat_core::config::MultimodalSettings;
use docchat_core::types::{CrossModalLink, Modality, RetrievalCandidate, SearchFilter, SourceTag};

use crate::combiner::{isolate, DocumentView, HybridRetriever, RetrievalRequest};
use crate::ladder::LadderRung;
use crate::merge::sort_by_score;
use crate::query::{analyze, QueryAnalysis};

#[derive(Debug, Clone, Default)]
pub struct MultimodalRetrieval {
    pub candidates: Vec<RetrievalCandidate>,
    pub analysis: QueryAnalysis,
    pub rung: Option<LadderRung>,
    pub links: Vec<CrossModalLink>,
}

/// Wraps the hybrid combiner for documents that mix text, image and audio
/// chunks: extra term and per-modality passes, deduplication on
/// `(chunk_index, text prefix)`, and modality-aware score multipliers.
pub struct MultimodalRetriever<'a> {
    hybrid: &'a HybridRetriever,
    settings: MultimodalSettings,
}

struct Pooled {
    candidate: RetrievalCandidate,
    primary: bool,
}

impl<'a> MultimodalRetriever<'a> {
    pub fn new(hybrid: &'a HybridRetriever, settings: MultimodalSettings) -> Self { Self { hybrid, settings } }

    pub async fn retrieve(&self, req: &RetrievalRequest<'_>, doc: &DocumentView<'_>) -> MultimodalRetrieval {
        let analysis = analyze(req.query);
        let pool = req.top_k.max(1) * 2;
        let doc_filter = SearchFilter::for_document(req.document_id);
        let weight = self.hybrid.settings().semantic_weight;
        let threshold = Some(self.hybrid.settings().semantic_threshold);

        let term_query = analysis.key_terms.join(" ");
        let term_pass = async {
            if term_query.is_empty() { return Vec::new(); }
            isolate(SourceTag::Semantic, self.hybrid.search(&term_query, pool, &doc_filter, threshold, SourceTag::Semantic))
                .await
                .unwrap_or_default()
                .into_iter()
                .map(|mut c| { c.final_score = c.raw_score * weight; c })
                .collect::<Vec<_>>()
        };
        let modality_passes = join_all(analysis.preferred_modalities.iter().map(|&m| {
            let filter = doc_filter.clone().with_modality(m);
            async move {
                isolate(SourceTag::Modality, self.hybrid.search(req.expanded_query, pool, &filter, threshold, SourceTag::Modality))
                    .await
                    .unwrap_or_default()
                    .into_iter()
                    .map(|mut c| { c.final_score = c.raw_score * weight; c })
                    .collect::<Vec<_>>()
            }
        }));
        let (primary, terms, modal) = futures::join!(self.hybrid.retrieve(req, doc), term_pass, modality_passes);

        let mut pooled: Vec<Pooled> = Vec::new();
        let mut index: HashMap<(usize, String), usize> = HashMap::new();
        let passes = std::iter::once((primary.candidates, true)).chain(std::iter::once((terms, false))).chain(modal.into_iter().map(|m| (m, false)));
        for (candidates, is_primary) in passes {
            for candidate in candidates {
                let key = (candidate.chunk.chunk_index, candidate.chunk.text.chars().take(self.settings.dedup_prefix_chars).collect::<String>());
                match index.get(&key) {
                    Some(&i) => {
                        let slot = &mut pooled[i];
                        slot.primary |= is_primary;
                        if candidate.final_score > slot.candidate.final_score { slot.candidate = candidate; }
                    }
                    None => {
                        index.insert(key, pooled.len());
                        pooled.push(Pooled { candidate, primary: is_primary });
                    }
                }
            }
        }

        let mut candidates: Vec<RetrievalCandidate> = pooled
            .into_iter()
            .map(|p| {
                let mut c = p.candidate;
                c.final_score *= self.multiplier(&c, &analysis, p.primary);
                c
            })
            .collect();
        sort_by_score(&mut candidates);
        candidates.truncate(req.top_k.max(1));
        let links = collect_links(&candidates);
        debug!(document_id = req.document_id, count = candidates.len(), links = links.len(), "multimodal retrieval");
        MultimodalRetrieval { candidates, analysis, rung: primary.rung, links }
    }

    /// Product of the modality weight and the preference, temporal and
    /// primary-pass boosts that apply to `c`.
    pub fn multiplier(&self, c: &RetrievalCandidate, analysis: &QueryAnalysis, primary: bool) -> f32 {
        let s = &self.settings;
        let mut m = match c.chunk.modality {
            Modality::Text => s.text_weight,
            Modality::Image => s.image_weight,
            Modality::Audio => s.audio_weight,
        };
        if analysis.prefers(c.chunk.modality) { m *= s.preferred_boost; }
        if analysis.temporal && c.chunk.time_range.is_some() { m *= s.temporal_boost; }
        if primary { m *= s.primary_boost; }
        m
    }
}

/// Cross-modal links of the selected chunks, deduplicated, in rank order.
pub fn collect_links(candidates: &[RetrievalCandidate]) -> Vec<CrossModalLink> {
    let mut out: Vec<CrossModalLink> = Vec::new();
    for link in candidates.iter().flat_map(|c| c.chunk.links.iter()) {
        if !out.contains(link) { out.push(link.clone()); }
    }
    out
}

