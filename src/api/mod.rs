use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Request body shared by the OpenAI-compatible and Ollama chat endpoints.
#[derive(Debug, Serialize, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub stream: bool,
}

#[derive(Deserialize)]
pub struct ChatResponseDelta {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct ChatResponseChoice {
    pub delta: ChatResponseDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// One `data:` payload of an OpenAI-compatible SSE stream.
#[derive(Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatResponseChoice>,
}

#[derive(Deserialize)]
pub struct CompletionMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub struct CompletionChoice {
    pub message: CompletionMessage,
}

/// Non-streaming OpenAI-compatible response.
#[derive(Deserialize)]
pub struct CompletionResponse {
    pub choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
pub struct OllamaMessage {
    #[serde(default)]
    pub content: String,
}

/// One NDJSON line from Ollama's `/api/chat`, or its non-streaming reply.
#[derive(Deserialize)]
pub struct OllamaChatResponse {
    #[serde(default)]
    pub message: Option<OllamaMessage>,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Deserialize)]
pub struct RemoteModel {
    pub id: String,
    pub created: Option<u64>,
    pub owned_by: Option<String>,
}

#[derive(Deserialize)]
pub struct ModelsResponse {
    pub data: Vec<RemoteModel>,
}

#[derive(Deserialize)]
pub struct OllamaTag {
    pub name: String,
    #[serde(default)]
    pub modified_at: Option<String>,
}

#[derive(Deserialize)]
pub struct OllamaTagsResponse {
    #[serde(default)]
    pub models: Vec<OllamaTag>,
}

pub mod models;
