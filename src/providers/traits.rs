use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::{GenerationRequest, GenerationResponse, ProviderError, StreamChunk};

/// Upstream generative API boundary. The concrete transport (HTTP+SSE, SDK)
/// lives behind this; the orchestrator only sees chunks and errors.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Single-shot generation. Used for side calls (auto-title, suggestions).
    async fn generate(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError>;

    /// Open a streaming generation call. Returns a chunk receiver only once
    /// the provider has confirmed the stream is open; anything before that
    /// (bad key, network refusal, HTTP error status) surfaces as `Err` so the
    /// caller can rotate credentials. Mid-stream failures arrive as `Err`
    /// items on the channel.
    async fn stream_generate(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>;
}
