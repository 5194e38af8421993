pub mod chat;
pub mod executor;
pub mod keys;
pub mod payload;
pub mod settings;
pub mod sidecall;
pub mod storage;

pub use chat::{ChatOrchestrator, GenerationOutcome};
pub use executor::{execute, execute_stream, ExecuteError, StreamEvent};
pub use keys::KeyRotation;
pub use settings::{AppSettings, SettingsService};
pub use storage::{KeyValueStore, MemoryStore};
