use anyhow::{anyhow, Result};
use arrow_array::{Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, StringArray, TimestampMillisecondArray};
use chrono::Utc;
use std::sync::Arc;

use docchat_core::types::{Chunk, ScoredPoint, VectorPoint};

use crate::schema::build_chunk_schema;

/// Convert points to one record batch. All vectors must have length `dim`.
pub fn points_to_record_batch(points: &[VectorPoint], dim: usize) -> Result<RecordBatch> {
    let dim_i32 = i32::try_from(dim).map_err(|_| anyhow!("dimension {} out of range", dim))?;
    let now = Utc::now().timestamp_millis();
    let mut ids = Vec::with_capacity(points.len());
    let mut doc_ids = Vec::with_capacity(points.len());
    let mut chunk_indices = Vec::with_capacity(points.len());
    let mut pages = Vec::with_capacity(points.len());
    let mut strategies = Vec::with_capacity(points.len());
    let mut modalities = Vec::with_capacity(points.len());
    let mut languages: Vec<Option<String>> = Vec::with_capacity(points.len());
    let mut payloads = Vec::with_capacity(points.len());
    let mut vectors: Vec<Option<Vec<Option<f32>>>> = Vec::with_capacity(points.len());
    for p in points {
        if p.vector.len() != dim {
            return Err(anyhow!("point {} has dimension {}, expected {}", p.id, p.vector.len(), dim));
        }
        let c = &p.payload;
        ids.push(p.id.clone());
        doc_ids.push(c.document_id.clone());
        chunk_indices.push(i32::try_from(c.chunk_index)?);
        pages.push(i32::try_from(c.page_number)?);
        strategies.push(c.strategy.as_str());
        modalities.push(c.modality.as_str());
        languages.push(c.language.clone());
        payloads.push(serde_json::to_string(c)?);
        vectors.push(Some(p.vector.iter().map(|&x| Some(x)).collect()));
    }
    let batch = RecordBatch::try_new(build_chunk_schema(dim_i32), vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(StringArray::from(doc_ids)),
        Arc::new(Int32Array::from(chunk_indices)),
        Arc::new(Int32Array::from(pages)),
        Arc::new(StringArray::from(strategies)),
        Arc::new(StringArray::from(modalities)),
        Arc::new(StringArray::from(languages)),
        Arc::new(StringArray::from(payloads)),
        Arc::new(TimestampMillisecondArray::from(vec![now; points.len()])),
        Arc::new(FixedSizeListArray::from_iter_primitive::<arrow_array::types::Float32Type, _, _>(vectors.into_iter(), dim_i32)),
    ])?;
    Ok(batch)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("{} column missing", name))
}

/// Decode search results. Lance reports cosine distance in `_distance`;
/// the score is `1 - distance`.
pub fn batch_to_scored(batch: &RecordBatch) -> Result<Vec<ScoredPoint>> {
    let ids = string_column(batch, "id")?;
    let payloads = string_column(batch, "payload")?;
    let distances = batch.column_by_name("_distance").and_then(|c| c.as_any().downcast_ref::<Float32Array>());
    let mut out = Vec::with_capacity(batch.num_rows());
    for i in 0..batch.num_rows() {
        if payloads.is_null(i) { continue; }
        let payload: Chunk = serde_json::from_str(payloads.value(i))?;
        let score = distances.map_or(0.0, |d| 1.0 - d.value(i));
        out.push(ScoredPoint { id: ids.value(i).to_string(), score, payload });
    }
    Ok(out)
}
