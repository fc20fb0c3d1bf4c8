use docchat_core::types::ConversationTurn;

/// Context handed to the answer prompt. An empty assembly must take the
/// `NoRelevantContext` path rather than be sent as an empty grounding block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptContext<'a> {
    Grounded(&'a str),
    NoRelevantContext,
}

impl<'a> PromptContext<'a> {
    pub fn from_assembled(text: &'a str) -> Self {
        if text.trim().is_empty() { PromptContext::NoRelevantContext } else { PromptContext::Grounded(text) }
    }
}

const GROUNDED: &str = "You answer questions about a single document. Use only the excerpts below. \
Cite the page or time marker of every excerpt you rely on, for example [Page 3]. \
If the excerpts do not contain the answer, say that the document does not cover it.";

const NO_CONTEXT: &str = "You answer questions about a single document, but no passage of it matched \
this question. Tell the user that no relevant content was found in the document and suggest \
rephrasing. Do not invent document content.";

/// System prompt, the trailing `history` turns, then the question.
pub fn answer_messages(question: &str, context: PromptContext<'_>, history: &[ConversationTurn]) -> Vec<ConversationTurn> {
    let system = match context {
        PromptContext::Grounded(text) => format!("{}\n\nDocument excerpts:\n{}", GROUNDED, text),
        PromptContext::NoRelevantContext => NO_CONTEXT.to_string(),
    };
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(ConversationTurn::system(system));
    messages.extend(history.iter().cloned());
    messages.push(ConversationTurn::user(question));
    messages
}

/// Ask for a standalone search query. Reply shape: `{"query": "..."}`.
pub fn expansion_messages(question: &str, history: &[ConversationTurn]) -> Vec<ConversationTurn> {
    let mut transcript = String::new();
    for turn in history {
        let role = match turn.role {
            docchat_core::types::Role::Assistant => "assistant",
            _ => "user",
        };
        transcript.push_str(&format!("{}: {}\n", role, turn.content));
    }
    vec![
        ConversationTurn::system(
            "Rewrite the user's latest message into a standalone search query for a document index. \
Resolve pronouns from the conversation and add useful synonyms. Reply with JSON only: {\"query\": \"...\"}",
        ),
        ConversationTurn::user(format!("Conversation:\n{}\nLatest message: {}", transcript, question)),
    ]
}

/// Ask for a 0-1 relevance score. Reply shape: `{"score": 0.0}`.
pub fn rerank_messages(query: &str, passage: &str) -> Vec<ConversationTurn> {
    vec![
        ConversationTurn::system(
            "Rate how relevant the passage is to the query on a scale from 0 to 1. Reply with JSON only: {\"score\": 0.0}",
        ),
        ConversationTurn::user(format!("Query: {}\n\nPassage:\n{}", query, passage)),
    ]
}
