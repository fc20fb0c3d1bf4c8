use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{info, warn};

use docchat_core::config::GenerationSettings;
use docchat_core::traits::{FragmentStream, GenerationBackend};
use docchat_core::types::{estimate_tokens, Citation, ConversationTurn, GenerateOptions, GenerationResult};
use docchat_core::{Error, GenerationError};

use crate::stream::{consume, StreamedReply, DONE_SENTINEL, EVENT_PREFIX};

/// Primary/secondary failover over two generation backends. The secondary is
/// tried exactly once, with the identical request, and its outcome is final.
pub struct Orchestrator {
    primary: Arc<dyn GenerationBackend>,
    secondary: Arc<dyn GenerationBackend>,
    options: GenerateOptions,
    timeout: Duration,
    id: String,
}

impl Orchestrator {
    pub fn new(primary: Arc<dyn GenerationBackend>, secondary: Arc<dyn GenerationBackend>, timeout: Duration) -> Self {
        let id = format!("{}|{}", primary.engine_id(), secondary.engine_id());
        Self { primary, secondary, options: GenerateOptions::default(), timeout, id }
    }

    pub fn from_settings(primary: Arc<dyn GenerationBackend>, secondary: Arc<dyn GenerationBackend>, settings: &GenerationSettings) -> Self {
        let options = GenerateOptions { model: None, temperature: settings.temperature, max_tokens: settings.max_tokens };
        Self::new(primary, secondary, Duration::from_secs(settings.timeout_secs)).with_options(options)
    }

    pub fn with_options(mut self, options: GenerateOptions) -> Self { self.options = options; self }

    pub fn timeout(&self) -> Duration { self.timeout }

    /// Stream an answer from the primary, failing over to the secondary.
    pub async fn answer(&self, messages: &[ConversationTurn]) -> Result<GenerationResult, Error> {
        let (engine, reply) = self.stream_with_failover(messages, &self.options).await?;
        Ok(self.result(engine, reply))
    }

    /// Each attempt gets its own deadline covering both opening the stream
    /// and reading it to a terminal state.
    async fn stream_with_failover(&self, messages: &[ConversationTurn], options: &GenerateOptions) -> Result<(&str, StreamedReply), Error> {
        let primary_err = match self.attempt(self.primary.as_ref(), messages, options).await {
            Ok(reply) => return Ok((self.primary.engine_id(), reply)),
            Err(e) => e,
        };
        warn!(engine = self.primary.engine_id(), error = %primary_err, "primary engine failed, failing over");
        match self.attempt(self.secondary.as_ref(), messages, options).await {
            Ok(reply) => Ok((self.secondary.engine_id(), reply)),
            Err(secondary_err) => {
                warn!(engine = self.secondary.engine_id(), error = %secondary_err, "secondary engine failed");
                Err(Error::GenerationFailed { primary: primary_err.to_string(), secondary: secondary_err.to_string() })
            }
        }
    }

    async fn attempt(&self, backend: &dyn GenerationBackend, messages: &[ConversationTurn], options: &GenerateOptions) -> Result<StreamedReply, GenerationError> {
        let deadline = Instant::now() + self.timeout;
        let timeout_secs = self.timeout.as_secs();
        let stream = match timeout_at(deadline, backend.generate_streaming(messages, options)).await {
            Ok(stream) => stream?,
            Err(_) => return Err(GenerationError::Timeout { timeout_secs }),
        };
        consume(stream, deadline).await.into_result(timeout_secs)
    }

    fn result(&self, engine: &str, reply: StreamedReply) -> GenerationResult {
        let mut metadata = reply.metadata;
        let tokens_used = metadata
            .get("tokens_used")
            .and_then(serde_json::Value::as_u64)
            .and_then(|n| usize::try_from(n).ok())
            .unwrap_or_else(|| estimate_tokens(&reply.content));
        let citations: Vec<Citation> = metadata
            .get("citations")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        metadata.insert("engine_used".into(), serde_json::Value::String(engine.to_string()));
        info!(engine, tokens_used, "generation completed");
        GenerationResult { content: reply.content, tokens_used, engine_used: engine.to_string(), thinking_steps: reply.thinking_steps, citations, metadata }
    }

    /// Non-streaming completion with the same failover policy. Returns the
    /// reply and the engine that produced it.
    pub async fn complete(&self, messages: &[ConversationTurn], options: &GenerateOptions) -> Result<(String, String), Error> {
        let deadline = Instant::now() + self.timeout;
        let primary_err = match self.complete_once(self.primary.as_ref(), messages, options, deadline).await {
            Ok(text) => return Ok((text, self.primary.engine_id().to_string())),
            Err(e) => e,
        };
        warn!(engine = self.primary.engine_id(), error = %primary_err, "primary engine failed, failing over");
        let deadline = Instant::now() + self.timeout;
        self.complete_once(self.secondary.as_ref(), messages, options, deadline)
            .await
            .map(|text| (text, self.secondary.engine_id().to_string()))
            .map_err(|secondary_err| Error::GenerationFailed { primary: primary_err.to_string(), secondary: secondary_err.to_string() })
    }

    async fn complete_once(&self, backend: &dyn GenerationBackend, messages: &[ConversationTurn], options: &GenerateOptions, deadline: Instant) -> Result<String, GenerationError> {
        match timeout_at(deadline, backend.generate(messages, options)).await {
            Ok(r) => r,
            Err(_) => Err(GenerationError::Timeout { timeout_secs: self.timeout.as_secs() }),
        }
    }
}

/// The orchestrator is itself a backend, so auxiliary calls (query
/// expansion, reranking) get the same failover.
#[async_trait]
impl GenerationBackend for Orchestrator {
    fn engine_id(&self) -> &str { &self.id }

    async fn generate(&self, messages: &[ConversationTurn], options: &GenerateOptions) -> Result<String, GenerationError> {
        self.complete(messages, options).await.map(|(text, _)| text).map_err(|e| GenerationError::Request { message: e.to_string() })
    }

    /// Resolves the whole failover before returning, then replays the
    /// winning reply as a completed event stream tagged with its engine.
    async fn generate_streaming(&self, messages: &[ConversationTurn], options: &GenerateOptions) -> Result<FragmentStream, GenerationError> {
        let (engine, reply) = self.stream_with_failover(messages, options).await.map_err(|e| GenerationError::Request { message: e.to_string() })?;
        Ok(stream::iter(replay(engine, reply).into_iter().map(Ok::<String, GenerationError>)).boxed())
    }
}

/// Event lines that a stream parser resolves back into `reply`.
fn replay(engine: &str, reply: StreamedReply) -> Vec<String> {
    let line = |event: serde_json::Value| format!("{} {}\n", EVENT_PREFIX, event);
    let mut metadata = reply.metadata;
    metadata.insert("engine_used".into(), serde_json::Value::String(engine.to_string()));
    let mut lines: Vec<String> = reply.thinking_steps.into_iter().map(|step| line(json!({"type": "thinking", "content": step}))).collect();
    lines.push(line(json!({"type": "final", "content": reply.content})));
    lines.push(line(json!({"type": "metadata", "data": metadata})));
    lines.push(format!("{} {}\n", EVENT_PREFIX, DONE_SENTINEL));
    lines
}
