use serde::{Deserialize, Serialize};

use crate::api;

pub const ROLE_USER: &str = "user";
pub const ROLE_ASSISTANT: &str = "assistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(self) -> &'static str {
        match self {
            ChatRole::User => ROLE_USER,
            ChatRole::Assistant => ROLE_ASSISTANT,
        }
    }
}

/// One turn of conversation history. The role is fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    role: ChatRole,
    content: String,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn role(&self) -> ChatRole {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Build the message list for a provider call: the history, in order,
/// followed by the new user turn.
pub fn format_messages(history: &[ChatMessage], new_message: &str) -> Vec<api::ChatMessage> {
    history
        .iter()
        .map(|message| api::ChatMessage {
            role: message.role.as_str().to_string(),
            content: message.content.clone(),
        })
        .chain(std::iter::once(api::ChatMessage {
            role: ROLE_USER.to_string(),
            content: new_message.to_string(),
        }))
        .collect()
}
