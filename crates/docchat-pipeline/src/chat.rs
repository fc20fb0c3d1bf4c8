use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use docchat_core::config::{MultimodalSettings, Settings};
use docchat_core::traits::{DocumentStore, EmbedProvider, VectorStore};
use docchat_core::types::{ChatRecord, Citation, ConversationTurn, CrossModalLink, Meta, Modality, RetrievalCandidate, Role};
use docchat_core::{Error, Result};
use docchat_generate::prompt::answer_messages;
use docchat_generate::{Orchestrator, PromptContext};
use docchat_hybrid::{assemble, assemble_multimodal, DocumentView, HybridRetriever, LadderRung, MultimodalRetriever, RetrievalRequest};

use crate::expand::expand_query;
use crate::input::MessageInput;

const CONTENT_UNAVAILABLE: &str = "This document has no readable content yet, so there is nothing to answer from. \
Try again once text extraction has finished, or upload a version with selectable text.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// Generated from assembled document context.
    Answered,
    /// Generated without context; the model was told nothing matched.
    NoRelevantContext,
    /// The document has no text at all; no generation call was made.
    ContentUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatAnswer {
    pub content: String,
    pub status: AnswerStatus,
    pub engine_used: Option<String>,
    pub tokens_used: usize,
    pub thinking_steps: Vec<String>,
    pub citations: Vec<Citation>,
    pub cross_modal_links: Vec<CrossModalLink>,
    pub fallback_rung: Option<LadderRung>,
    pub expanded_query: String,
}

struct Retrieved {
    candidates: Vec<RetrievalCandidate>,
    rung: Option<LadderRung>,
    links: Vec<CrossModalLink>,
    multimodal: bool,
}

/// Per-message chat flow over one document.
pub struct ChatPipeline {
    documents: Arc<dyn DocumentStore>,
    retriever: HybridRetriever,
    orchestrator: Arc<Orchestrator>,
    multimodal: MultimodalSettings,
    top_k: usize,
    token_budget: usize,
    history_turns: usize,
    expand_queries: bool,
}

impl ChatPipeline {
    pub fn new(
        settings: &Settings,
        embedder: Arc<dyn EmbedProvider>,
        vectors: Arc<dyn VectorStore>,
        documents: Arc<dyn DocumentStore>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        let retriever = HybridRetriever::new(embedder, vectors, settings.retrieval.clone()).with_reranker(orchestrator.clone());
        Self {
            documents,
            retriever,
            orchestrator,
            multimodal: settings.multimodal.clone(),
            top_k: settings.retrieval.top_k,
            token_budget: settings.context.token_budget,
            history_turns: settings.generation.history_turns,
            expand_queries: settings.generation.expand_queries,
        }
    }

    /// Open chat `chat_id` on `document_id`, creating it when missing.
    pub async fn start_chat(&self, chat_id: &str, document_id: &str) -> Result<ChatRecord> {
        if let Some(chat) = self.documents.chat(chat_id).await.map_err(store_error)? {
            if chat.document_id != document_id {
                return Err(Error::InvalidConfig(format!("chat '{}' belongs to document '{}'", chat_id, chat.document_id)));
            }
            return Ok(chat);
        }
        let chat = ChatRecord { id: chat_id.to_string(), document_id: document_id.to_string(), messages: Vec::new() };
        self.documents.save_chat(chat.clone()).await.map_err(store_error)?;
        info!(chat_id, document_id, "started chat");
        Ok(chat)
    }

    /// Answer the latest user turn of `input` within chat `chat_id`, and
    /// record the exchange in the chat history.
    pub async fn answer(&self, chat_id: &str, input: &MessageInput) -> Result<ChatAnswer> {
        let turns = input.normalize();
        let Some(at) = turns.iter().rposition(|t| t.role == Role::User) else {
            return Err(Error::Operation("message contains no user turn".into()));
        };
        let question = turns[at].content.as_str();

        let chat = self.documents.chat(chat_id).await.map_err(store_error)?.ok_or_else(|| Error::NotFound(format!("chat '{}'", chat_id)))?;
        let document = self
            .documents
            .document(&chat.document_id)
            .await
            .map_err(store_error)?
            .ok_or_else(|| Error::NotFound(format!("document '{}'", chat.document_id)))?;

        let skip = chat.messages.len().saturating_sub(self.history_turns);
        let history: Vec<ConversationTurn> = chat.messages[skip..].iter().chain(&turns[..at]).cloned().collect();

        let expanded_query = if self.expand_queries && document.has_text() {
            expand_query(self.orchestrator.as_ref(), question, &history).await
        } else {
            question.to_string()
        };
        debug!(chat_id, query = question, expanded = %expanded_query, "retrieving");

        let view = DocumentView { chunks: &document.chunks, raw_text: &document.raw_text, page_count: document.page_count() };
        let request = RetrievalRequest::new(&document.id, question, &expanded_query, self.top_k);
        let retrieved = self.retrieve(&request, &view).await;

        if retrieved.candidates.is_empty() && !document.has_text() {
            info!(chat_id, document_id = %document.id, "document has no content, skipping generation");
            let answer = ChatAnswer {
                content: CONTENT_UNAVAILABLE.to_string(),
                status: AnswerStatus::ContentUnavailable,
                engine_used: None,
                tokens_used: 0,
                thinking_steps: Vec::new(),
                citations: Vec::new(),
                cross_modal_links: Vec::new(),
                fallback_rung: None,
                expanded_query,
            };
            self.record(chat_id, question, &answer).await?;
            return Ok(answer);
        }

        let context = if retrieved.multimodal {
            assemble_multimodal(&retrieved.candidates, self.token_budget)
        } else {
            assemble(&retrieved.candidates, self.token_budget)
        };
        let prompt_context = PromptContext::from_assembled(&context.text);
        let status = match prompt_context {
            PromptContext::Grounded(_) => AnswerStatus::Answered,
            PromptContext::NoRelevantContext => AnswerStatus::NoRelevantContext,
        };
        let messages = answer_messages(question, prompt_context, &history);
        let result = self.orchestrator.answer(&messages).await?;

        let citations = if result.citations.is_empty() { context.included } else { result.citations };
        let answer = ChatAnswer {
            content: result.content,
            status,
            engine_used: Some(result.engine_used),
            tokens_used: result.tokens_used,
            thinking_steps: result.thinking_steps,
            citations,
            cross_modal_links: retrieved.links,
            fallback_rung: retrieved.rung,
            expanded_query,
        };
        self.record(chat_id, question, &answer).await?;
        info!(chat_id, status = ?answer.status, engine = ?answer.engine_used, tokens = answer.tokens_used, "answered");
        Ok(answer)
    }

    async fn retrieve(&self, request: &RetrievalRequest<'_>, view: &DocumentView<'_>) -> Retrieved {
        if view.chunks.iter().any(|c| c.modality != Modality::Text) {
            let found = MultimodalRetriever::new(&self.retriever, self.multimodal.clone()).retrieve(request, view).await;
            Retrieved { candidates: found.candidates, rung: found.rung, links: found.links, multimodal: true }
        } else {
            let found = self.retriever.retrieve(request, view).await;
            Retrieved { candidates: found.candidates, rung: found.rung, links: Vec::new(), multimodal: false }
        }
    }

    async fn record(&self, chat_id: &str, question: &str, answer: &ChatAnswer) -> Result<()> {
        let mut meta = Meta::new();
        if let Some(engine) = &answer.engine_used {
            meta.insert("engine_used".into(), serde_json::Value::String(engine.clone()));
        }
        meta.insert("tokens_used".into(), serde_json::Value::from(answer.tokens_used));
        meta.insert("citations".into(), serde_json::to_value(&answer.citations)?);
        let mut reply = ConversationTurn::assistant(answer.content.clone());
        reply.metadata = Some(meta);
        self.documents.append_turns(chat_id, vec![ConversationTurn::user(question), reply]).await.map_err(store_error)
    }
}

fn store_error(e: anyhow::Error) -> Error { Error::Operation(format!("{:#}", e)) }
