use thiserror::Error;

use crate::models::{Attachment, GroundingInfo, Role};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Authentication failed: {0}")]
    AuthError(String),

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Stream error: {0}")]
    StreamError(String),
}

// --- Request types ---

/// One history turn in provider-neutral form. The adapter maps this onto the
/// wire schema: attachment parts first, text part last, text omitted if empty.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

/// Built-in provider tools enabled for one call. The payload builder resolves
/// per-call toggles, persona defaults, and settings defaults into this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ToolSelection {
    pub web_search: bool,
    pub code_execution: bool,
    pub url_context: bool,
}

impl ToolSelection {
    pub fn is_empty(&self) -> bool {
        !(self.web_search || self.code_execution || self.url_context)
    }
}

/// Everything a backend needs for one generation call, minus the credential.
/// Ephemeral: built fresh per send, never persisted.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub system_instruction: Option<String>,
    pub tools: ToolSelection,
    pub include_thoughts: bool,
    /// Ask the provider for a raw JSON body (side calls only).
    pub json_response: bool,
}

// --- Response types ---

/// One incremental unit of a streamed response.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Plain text delta, appended to the message content.
    Text(String),
    /// Internal-reasoning delta, present only when thoughts were requested.
    Thought(String),
    /// Citation metadata, arrives once near the end of a grounded stream.
    Grounding(GroundingInfo),
    /// Clean end of stream. A channel that closes without this is a transport
    /// failure and gets retried by the executor.
    Done,
}

#[derive(Debug, Clone)]
pub struct GenerationResponse {
    pub text: String,
    pub grounding: Option<GroundingInfo>,
}
