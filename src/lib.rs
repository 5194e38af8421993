//! Resilient streaming chat orchestration for Gemini-style generative APIs.
//!
//! The crate turns an outgoing user message into a streaming generation call,
//! rotates across a pool of API keys on failure, merges incremental chunks
//! into a shared conversation without tearing, and supports cooperative
//! cancellation plus regenerate / edit-and-resubmit history replay. Storage
//! and UI stay outside, behind the [`services::storage::KeyValueStore`] port
//! and the shared conversation handle.

pub mod models;
pub mod providers;
pub mod services;

pub use models::{Attachment, Conversation, Message, Persona, Role, ToolConfig};
pub use providers::{GeminiBackend, GenerativeBackend, ProviderError, StreamChunk};
pub use services::{
    AppSettings, ChatOrchestrator, ExecuteError, GenerationOutcome, KeyRotation, KeyValueStore,
    MemoryStore, SettingsService, StreamEvent,
};
