use serde::Deserialize;

use docchat_core::types::{ConversationTurn, Role};

/// Accepted shapes of an inbound message: a bare string, a `{role, content}`
/// object, or a list of either (nested lists allowed).
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageInput {
    Text(String),
    Turn { role: String, content: String },
    Many(Vec<MessageInput>),
}

impl From<&str> for MessageInput {
    fn from(s: &str) -> Self { MessageInput::Text(s.to_string()) }
}

impl MessageInput {
    /// Flatten into turns, in order. Bare strings and unknown roles become
    /// user turns; blank contents are dropped.
    pub fn normalize(&self) -> Vec<ConversationTurn> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<ConversationTurn>) {
        match self {
            MessageInput::Text(text) => push(out, Role::User, text),
            MessageInput::Turn { role, content } => {
                let role = match role.trim().to_ascii_lowercase().as_str() {
                    "assistant" => Role::Assistant,
                    "system" => Role::System,
                    _ => Role::User,
                };
                push(out, role, content);
            }
            MessageInput::Many(items) => items.iter().for_each(|i| i.flatten_into(out)),
        }
    }
}

fn push(out: &mut Vec<ConversationTurn>, role: Role, content: &str) {
    let content = content.trim();
    if !content.is_empty() { out.push(ConversationTurn::new(role, content)); }
}
