//! Streaming parse state machine.
//!
//! `AwaitingFirstEvent -> Accumulating -> {Completed | Failed | TimedOut}`.
//! Fragments are buffered and split on newlines; the trailing partial line is
//! kept for the next fragment. Once a terminal state is reached every later
//! input is discarded.

use futures::StreamExt;
use serde::Deserialize;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use docchat_core::traits::FragmentStream;
use docchat_core::types::Meta;
use docchat_core::GenerationError;

pub const EVENT_PREFIX: &str = "data:";
pub const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone, PartialEq)]
pub enum StreamState {
    AwaitingFirstEvent,
    Accumulating,
    Completed,
    Failed(GenerationError),
    TimedOut,
}

impl StreamState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamState::Completed | StreamState::Failed(_) | StreamState::TimedOut)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StreamEvent {
    Thinking { content: String },
    Final { content: String },
    Metadata { data: Meta },
}

/// Content and side channels of a completed stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamedReply {
    pub content: String,
    pub thinking_steps: Vec<String>,
    pub metadata: Meta,
}

#[derive(Debug)]
pub struct StreamParser {
    state: StreamState,
    buffer: String,
    thinking: Vec<String>,
    content: Option<String>,
    metadata: Meta,
}

impl Default for StreamParser {
    fn default() -> Self { Self::new() }
}

impl StreamParser {
    pub fn new() -> Self {
        Self { state: StreamState::AwaitingFirstEvent, buffer: String::new(), thinking: Vec::new(), content: None, metadata: Meta::new() }
    }

    pub fn state(&self) -> &StreamState { &self.state }

    pub fn content(&self) -> Option<&str> { self.content.as_deref() }

    pub fn thinking_steps(&self) -> &[String] { &self.thinking }

    pub fn metadata(&self) -> &Meta { &self.metadata }

    pub fn feed(&mut self, fragment: &str) {
        if self.state.is_terminal() {
            debug!(len = fragment.len(), "discarding fragment after resolution");
            return;
        }
        self.state = StreamState::Accumulating;
        self.buffer.push_str(fragment);
        while let Some(end) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=end).collect();
            self.handle_line(line.trim());
        }
    }

    /// End of stream. Any unterminated last line is parsed before resolving.
    pub fn finish(&mut self) {
        if self.state.is_terminal() { return; }
        let rest = std::mem::take(&mut self.buffer);
        self.handle_line(rest.trim());
        self.state = if self.content.is_some() { StreamState::Completed } else { StreamState::Failed(GenerationError::EmptyResponse) };
    }

    pub fn fail(&mut self, error: GenerationError) {
        if !self.state.is_terminal() { self.state = StreamState::Failed(error); }
    }

    pub fn time_out(&mut self) {
        if !self.state.is_terminal() { self.state = StreamState::TimedOut; }
    }

    fn handle_line(&mut self, line: &str) {
        let Some(body) = line.strip_prefix(EVENT_PREFIX).map(str::trim_start) else { return };
        if body.is_empty() || body == DONE_SENTINEL { return; }
        match serde_json::from_str::<StreamEvent>(body) {
            Ok(StreamEvent::Thinking { content }) => self.thinking.push(content),
            Ok(StreamEvent::Final { content }) => self.content = Some(content),
            Ok(StreamEvent::Metadata { data }) => self.metadata.extend(data),
            Err(e) => debug!(error = %e, "skipping unparseable stream event"),
        }
    }

    /// Resolve into the reply, or the error that ended the stream.
    /// `timeout_secs` is only used to describe a timeout.
    pub fn into_result(self, timeout_secs: u64) -> Result<StreamedReply, GenerationError> {
        match self.state {
            StreamState::Completed => Ok(StreamedReply { content: self.content.unwrap_or_default(), thinking_steps: self.thinking, metadata: self.metadata }),
            StreamState::Failed(e) => Err(e),
            StreamState::TimedOut => Err(GenerationError::Timeout { timeout_secs }),
            StreamState::AwaitingFirstEvent | StreamState::Accumulating => Err(GenerationError::Stream { message: "stream was not resolved".into() }),
        }
    }
}

/// Drive `stream` through a parser until it resolves or `deadline` passes.
/// The stream is dropped before returning on every path.
pub async fn consume(stream: FragmentStream, deadline: Instant) -> StreamParser {
    let mut parser = StreamParser::new();
    let drive = {
        let parser = &mut parser;
        let mut stream = stream;
        async move {
            while let Some(item) = stream.next().await {
                match item {
                    Ok(fragment) => parser.feed(&fragment),
                    Err(e) => {
                        parser.fail(e);
                        return;
                    }
                }
            }
            parser.finish();
        }
    };
    if timeout_at(deadline, drive).await.is_err() {
        parser.time_out();
    }
    parser
}
