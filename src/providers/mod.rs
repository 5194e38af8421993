pub mod gemini;
pub mod traits;
pub mod types;

pub use gemini::GeminiBackend;
pub use traits::GenerativeBackend;
pub use types::{
    ChatMessage, GenerationRequest, GenerationResponse, ProviderError, StreamChunk, ToolSelection,
};
