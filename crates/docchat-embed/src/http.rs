use async_trait::async_trait;
use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use tracing::debug;

use docchat_core::config::EmbeddingSettings;
use docchat_core::traits::EmbedProvider;

use crate::l2_normalize;

/// Client for an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
    batch_size: usize,
    id: String,
}

impl HttpEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>, dim: usize, batch_size: usize) -> Self {
        let model = model.into();
        let id = format!("http:{}:d{}", model, dim);
        Self { client: reqwest::Client::new(), endpoint: endpoint.into(), model, api_key, dim, batch_size: batch_size.max(1), id }
    }

    /// The API key, when configured, is read from the environment variable
    /// named by `api_key_env`.
    pub fn from_settings(settings: &EmbeddingSettings) -> Result<Self> {
        let api_key = match &settings.api_key_env {
            Some(var) => Some(std::env::var(var).with_context(|| format!("embedding api key variable '{}' is not set", var))?),
            None => None,
        };
        Ok(Self::new(settings.endpoint.clone(), settings.model.clone(), api_key, settings.dim, settings.batch_size))
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({ "model": self.model, "input": texts });
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key { req = req.bearer_auth(key); }
        let resp = req.send().await.context("embedding request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("embedding endpoint returned {}: {}", status, text));
        }
        let json: Value = resp.json().await.context("embedding response is not JSON")?;
        parse_embeddings(&json, texts.len(), self.dim)
    }
}

/// Extract `data[i].embedding` for `expected` inputs and normalize each vector.
pub fn parse_embeddings(json: &Value, expected: usize, dim: usize) -> Result<Vec<Vec<f32>>> {
    let data = json["data"].as_array().ok_or_else(|| anyhow!("embedding response has no data array"))?;
    if data.len() != expected {
        return Err(anyhow!("expected {} embeddings, got {}", expected, data.len()));
    }
    data.iter()
        .map(|item| {
            let values = item["embedding"].as_array().ok_or_else(|| anyhow!("embedding entry missing vector"))?;
            let mut v: Vec<f32> = values.iter().filter_map(|x| x.as_f64().map(|f| f as f32)).collect();
            if v.len() != dim {
                return Err(anyhow!("embedding has dimension {}, expected {}", v.len(), dim));
            }
            l2_normalize(&mut v);
            Ok(v)
        })
        .collect()
}

#[async_trait]
impl EmbedProvider for HttpEmbedder {
    fn embedder_id(&self) -> &str { &self.id }
    fn dim(&self) -> usize { self.dim }
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            debug!(size = batch.len(), "embedding batch");
            out.extend(self.request(batch).await?);
        }
        Ok(out)
    }
}
