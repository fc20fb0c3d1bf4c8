//! docchat-embed
//!
//! Embedding providers behind `docchat_core::traits::EmbedProvider`. Every
//! provider returns L2-normalized vectors of one fixed dimensionality.

pub mod hash;
pub mod http;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use docchat_core::config::EmbeddingSettings;
use docchat_core::traits::EmbedProvider;
use tracing::info;

pub use hash::HashEmbedder;
pub use http::HttpEmbedder;

/// Build the provider named by `settings.provider` (`hash` or `http`).
pub fn provider_from_settings(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbedProvider>> {
    let provider: Arc<dyn EmbedProvider> = match settings.provider.as_str() {
        "hash" => Arc::new(HashEmbedder::new(settings.dim)),
        "http" => Arc::new(HttpEmbedder::from_settings(settings)?),
        other => return Err(anyhow!("unknown embedding provider '{}'", other)),
    };
    info!(embedder = provider.embedder_id(), dim = provider.dim(), "embedding provider ready");
    Ok(provider)
}

pub(crate) fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
    for x in v.iter_mut() { *x /= norm; }
}
