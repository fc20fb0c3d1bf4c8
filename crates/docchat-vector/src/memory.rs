use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use docchat_core::traits::VectorStore;
use docchat_core::types::{DeleteSelector, ScoredPoint, SearchFilter, VectorPoint};

use crate::cosine_similarity;

struct Collection {
    dim: usize,
    points: BTreeMap<String, VectorPoint>,
}

/// Process-local vector store. The lock is never held across an await.
#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self { Self::default() }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.read().map(|c| c.get(collection).map_or(0, |c| c.points.len())).unwrap_or(0)
    }

    pub fn is_empty(&self, collection: &str) -> bool { self.len(collection) == 0 }
}

fn poisoned<T>(_: T) -> anyhow::Error { anyhow!("vector store lock poisoned") }

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<()> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        match guard.get(collection) {
            Some(c) if c.dim != dim => Err(anyhow!("collection '{}' has dimension {}, expected {}", collection, c.dim, dim)),
            Some(_) => Ok(()),
            None => {
                guard.insert(collection.to_string(), Collection { dim, points: BTreeMap::new() });
                Ok(())
            }
        }
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        let guard = self.collections.read().map_err(poisoned)?;
        let c = guard.get(collection).ok_or_else(|| anyhow!("collection '{}' does not exist", collection))?;
        if query_vector.len() != c.dim {
            return Err(anyhow!("query has dimension {}, expected {}", query_vector.len(), c.dim));
        }
        let mut hits: Vec<ScoredPoint> = c
            .points
            .values()
            .filter(|p| filter.map_or(true, |f| f.matches(&p.payload)))
            .map(|p| ScoredPoint { id: p.id.clone(), score: cosine_similarity(query_vector, &p.vector), payload: p.payload.clone() })
            .filter(|h| score_threshold.map_or(true, |t| h.score >= t))
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        let c = guard.get_mut(collection).ok_or_else(|| anyhow!("collection '{}' does not exist", collection))?;
        if let Some(bad) = points.iter().find(|p| p.vector.len() != c.dim) {
            return Err(anyhow!("point {} has dimension {}, expected {}", bad.id, bad.vector.len(), c.dim));
        }
        for p in points { c.points.insert(p.id.clone(), p); }
        Ok(())
    }

    async fn delete(&self, collection: &str, selector: DeleteSelector) -> Result<()> {
        let mut guard = self.collections.write().map_err(poisoned)?;
        let c = guard.get_mut(collection).ok_or_else(|| anyhow!("collection '{}' does not exist", collection))?;
        match selector {
            DeleteSelector::Id(id) => { c.points.remove(&id); }
            DeleteSelector::Filter(filter) => c.points.retain(|_, p| !filter.matches(&p.payload)),
        }
        Ok(())
    }
}
