use anyhow::{anyhow, Result};
use arrow_array::RecordBatchIterator;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::path::Path;
use tracing::{debug, info};

use docchat_core::traits::VectorStore;
use docchat_core::types::{DeleteSelector, ScoredPoint, SearchFilter, VectorPoint};

use crate::filter::filter_to_sql;
use crate::schema::{build_chunk_schema, vector_dim};
use crate::writer::{batch_to_scored, points_to_record_batch};

/// Vector store backed by a local LanceDB database; one table per collection.
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let db = connect(path.to_string_lossy().as_ref()).execute().await?;
        info!(path = %path.display(), "opened lance vector store");
        Ok(Self { db })
    }

    async fn table(&self, collection: &str) -> Result<Table> {
        let names = self.db.table_names().execute().await?;
        if !names.iter().any(|n| n == collection) {
            return Err(anyhow!("collection '{}' does not exist", collection));
        }
        Ok(self.db.open_table(collection).execute().await?)
    }
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn ensure_collection(&self, collection: &str, dim: usize) -> Result<()> {
        let names = self.db.table_names().execute().await?;
        if names.iter().any(|n| n == collection) {
            let table = self.db.open_table(collection).execute().await?;
            let existing = vector_dim(table.schema().await?.as_ref());
            if existing != Some(dim) {
                return Err(anyhow!("collection '{}' has dimension {:?}, expected {}", collection, existing, dim));
            }
            return Ok(());
        }
        let schema = build_chunk_schema(i32::try_from(dim)?);
        // create empty table with 0 rows
        let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
        self.db.create_table(collection, Box::new(iter)).execute().await?;
        info!(collection, dim, "created collection");
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        filter: Option<&SearchFilter>,
        score_threshold: Option<f32>,
    ) -> Result<Vec<ScoredPoint>> {
        let table = self.table(collection).await?;
        if top_k == 0 || table.count_rows(None).await? == 0 { return Ok(Vec::new()); }
        let mut query = table.vector_search(query_vector.to_vec())?.distance_type(DistanceType::Cosine).limit(top_k);
        if let Some(predicate) = filter.and_then(filter_to_sql) {
            query = query.only_if(predicate);
        }
        let mut stream = query.execute().await?;
        let mut hits = Vec::new();
        while let Some(batch) = stream.try_next().await? {
            hits.extend(batch_to_scored(&batch)?);
        }
        if let Some(t) = score_threshold { hits.retain(|h| h.score >= t); }
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        debug!(collection, hits = hits.len(), "lance search");
        Ok(hits)
    }

    async fn upsert(&self, collection: &str, points: Vec<VectorPoint>) -> Result<()> {
        if points.is_empty() { return Ok(()); }
        let table = self.table(collection).await?;
        let dim = vector_dim(table.schema().await?.as_ref()).ok_or_else(|| anyhow!("collection '{}' has no vector column", collection))?;
        let batch = points_to_record_batch(&points, dim)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        // Upsert behavior via merge_insert: id is unique
        let mut mi = table.merge_insert(&["id"]);
        mi.when_matched_update_all(None).when_not_matched_insert_all();
        mi.execute(reader).await?;
        debug!(collection, count = points.len(), "upserted points");
        Ok(())
    }

    async fn delete(&self, collection: &str, selector: DeleteSelector) -> Result<()> {
        let table = self.table(collection).await?;
        let predicate = match selector {
            DeleteSelector::Id(id) => format!("id = '{}'", id.replace('\'', "''")),
            DeleteSelector::Filter(filter) => filter_to_sql(&filter).ok_or_else(|| anyhow!("refusing to delete with an empty filter"))?,
        };
        table.delete(&predicate).await?;
        debug!(collection, predicate = %predicate, "deleted points");
        Ok(())
    }
}
