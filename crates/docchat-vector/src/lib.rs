//! docchat-vector
//!
//! Vector search service implementations: a LanceDB-backed store for
//! persistent collections and an in-memory store for tests and small
//! deployments. Both use cosine similarity and return higher-is-better scores.

pub mod filter;
pub mod lance;
pub mod memory;
pub mod schema;
pub mod writer;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use docchat_core::config::{resolve_with_base, VectorSettings};
use docchat_core::traits::VectorStore;

pub use lance::LanceVectorStore;
pub use memory::InMemoryVectorStore;

/// Deterministic point id for a chunk: the first 16 bytes of
/// `blake3("<document_id>:<chunk_index>")` in UUID layout.
pub fn point_id(document_id: &str, chunk_index: usize) -> String {
    let hash = blake3::hash(format!("{}:{}", document_id, chunk_index).as_bytes());
    let b = &hash.as_bytes()[..16];
    let hex: String = b.iter().map(|x| format!("{:02x}", x)).collect();
    format!("{}-{}-{}-{}-{}", &hex[0..8], &hex[8..12], &hex[12..16], &hex[16..20], &hex[20..32])
}

/// Open the store named by `settings.backend` (`lance` or `memory`). Relative
/// paths resolve against `base`.
pub async fn store_from_settings(settings: &VectorSettings, base: &Path) -> Result<Arc<dyn VectorStore>> {
    match settings.backend.as_str() {
        "lance" => {
            let path = resolve_with_base(base, &settings.path);
            Ok(Arc::new(LanceVectorStore::open(&path).await?))
        }
        "memory" => Ok(Arc::new(InMemoryVectorStore::new())),
        other => Err(anyhow!("unknown vector backend '{}'", other)),
    }
}

/// Cosine similarity; zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut na, mut nb) = (0f32, 0f32, 0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na.sqrt() * nb.sqrt()) }
}
