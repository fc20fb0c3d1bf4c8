use serde::Deserialize;
use tracing::{debug, warn};

use docchat_core::traits::GenerationBackend;
use docchat_core::types::{ConversationTurn, GenerateOptions};
use docchat_generate::decode_reply;
use docchat_generate::prompt::expansion_messages;

#[derive(Debug, Deserialize)]
struct Expansion {
    query: String,
}

/// Rewrite `question` into a standalone search query. Any failure falls back
/// to the question itself.
pub async fn expand_query(backend: &dyn GenerationBackend, question: &str, history: &[ConversationTurn]) -> String {
    let options = GenerateOptions { temperature: Some(0.0), max_tokens: Some(128), ..GenerateOptions::default() };
    let reply = match backend.generate(&expansion_messages(question, history), &options).await {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "query expansion failed, using the original query");
            return question.to_string();
        }
    };
    match decode_reply::<Expansion>(&reply) {
        Ok(decoded) if !decoded.value.query.trim().is_empty() => {
            debug!(step = ?decoded.step, "expanded query");
            decoded.value.query.trim().to_string()
        }
        Ok(_) => question.to_string(),
        Err(e) => {
            warn!(error = %e, "query expansion reply not decodable, using the original query");
            question.to_string()
        }
    }
}
