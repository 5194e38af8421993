pub mod attachment;
pub mod conversation;
pub mod message;
pub mod persona;
pub mod tools;

pub use attachment::Attachment;
pub use conversation::Conversation;
pub use message::{GroundingInfo, GroundingSource, Message, Role};
pub use persona::Persona;
pub use tools::ToolConfig;
