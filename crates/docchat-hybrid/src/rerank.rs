use futures::future::join_all;
use serde::Deserialize;
use tracing::{debug, warn};

use docchat_core::traits::GenerationBackend;
use docchat_core::types::{GenerateOptions, RetrievalCandidate};
use docchat_generate::decode_reply;
use docchat_generate::prompt::rerank_messages;

#[derive(Debug, Deserialize)]
struct RelevanceScore {
    score: f32,
}

/// Score every candidate independently; `final = (original + rerank) / 2`.
/// A failed call leaves that candidate's score untouched.
pub async fn rerank(backend: &dyn GenerationBackend, query: &str, candidates: Vec<RetrievalCandidate>) -> Vec<RetrievalCandidate> {
    let options = GenerateOptions { temperature: Some(0.0), max_tokens: Some(32), ..GenerateOptions::default() };
    let scored = candidates.into_iter().map(|mut c| {
        let options = &options;
        async move {
            match relevance(backend, query, &c.chunk.text, options).await {
                Ok(score) => {
                    c.rerank_score = Some(score);
                    c.final_score = (c.final_score + score) / 2.0;
                }
                Err(e) => warn!(chunk_index = c.chunk.chunk_index, error = %e, "rerank failed, keeping original score"),
            }
            c
        }
    });
    let mut out = join_all(scored).await;
    crate::merge::sort_by_score(&mut out);
    debug!(count = out.len(), "reranked candidates");
    out
}

async fn relevance(backend: &dyn GenerationBackend, query: &str, passage: &str, options: &GenerateOptions) -> anyhow::Result<f32> {
    let reply = backend.generate(&rerank_messages(query, passage), options).await?;
    let score = match decode_reply::<RelevanceScore>(&reply) {
        Ok(decoded) => decoded.value.score,
        Err(e) => reply.trim().parse::<f32>().map_err(|_| e)?,
    };
    if !score.is_finite() { anyhow::bail!("non-finite relevance score"); }
    Ok(score.clamp(0.0, 1.0))
}
