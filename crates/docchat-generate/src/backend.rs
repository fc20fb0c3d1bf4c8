use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Value};
use tracing::debug;

use docchat_core::config::BackendSettings;
use docchat_core::traits::{FragmentStream, GenerationBackend};
use docchat_core::types::{ConversationTurn, GenerateOptions};
use docchat_core::GenerationError;

/// Generation backend reached over HTTP. Streaming replies are
/// newline-delimited `data: {...}` events; non-streaming replies are
/// `{"content": "..."}`.
pub struct HttpBackend {
    client: reqwest::Client,
    engine_id: String,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
}

impl HttpBackend {
    pub fn new(engine_id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), engine_id: engine_id.into(), endpoint: endpoint.into(), api_key: None, model: None }
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self { self.api_key = Some(key.into()); self }

    pub fn with_model(mut self, model: impl Into<String>) -> Self { self.model = Some(model.into()); self }

    pub fn from_settings(settings: &BackendSettings) -> anyhow::Result<Self> {
        let mut backend = Self::new(settings.engine_id.clone(), settings.endpoint.clone());
        if let Some(var) = &settings.api_key_env {
            let key = std::env::var(var).map_err(|_| anyhow::anyhow!("api key variable '{}' for engine '{}' is not set", var, settings.engine_id))?;
            backend = backend.with_api_key(key);
        }
        if let Some(model) = &settings.model { backend = backend.with_model(model.clone()); }
        Ok(backend)
    }

    async fn post(&self, messages: &[ConversationTurn], options: &GenerateOptions, stream: bool) -> Result<reqwest::Response, GenerationError> {
        let mut options = options.clone();
        if options.model.is_none() { options.model.clone_from(&self.model); }
        let body = json!({ "messages": messages, "options": options, "stream": stream });
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key { req = req.bearer_auth(key); }
        let resp = req.send().await.map_err(|e| GenerationError::Request { message: e.to_string() })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Status { status: status.as_u16(), body });
        }
        debug!(engine = %self.engine_id, stream, "backend accepted request");
        Ok(resp)
    }
}

#[async_trait]
impl GenerationBackend for HttpBackend {
    fn engine_id(&self) -> &str { &self.engine_id }

    async fn generate(&self, messages: &[ConversationTurn], options: &GenerateOptions) -> Result<String, GenerationError> {
        let resp = self.post(messages, options, false).await?;
        let json: Value = resp.json().await.map_err(|e| GenerationError::Parse { message: e.to_string() })?;
        match json["content"].as_str() {
            Some(content) if !content.trim().is_empty() => Ok(content.to_string()),
            _ => Err(GenerationError::EmptyResponse),
        }
    }

    async fn generate_streaming(&self, messages: &[ConversationTurn], options: &GenerateOptions) -> Result<FragmentStream, GenerationError> {
        let resp = self.post(messages, options, true).await?;
        let mut carry = Utf8Carry::default();
        let stream = resp.bytes_stream().map(move |chunk| match chunk {
            Ok(bytes) => Ok(carry.push(&bytes)),
            Err(e) => Err(GenerationError::Stream { message: e.to_string() }),
        });
        Ok(stream.boxed())
    }
}

/// Holds back the incomplete tail of a multi-byte character split across
/// network chunks.
#[derive(Debug, Default)]
pub struct Utf8Carry {
    pending: Vec<u8>,
}

impl Utf8Carry {
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let valid = match std::str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            // invalid sequence, not just a truncated one
            Err(_) => {
                let out = String::from_utf8_lossy(&self.pending).into_owned();
                self.pending.clear();
                return out;
            }
        };
        let rest = self.pending.split_off(valid);
        let out = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending = rest;
        out
    }
}
