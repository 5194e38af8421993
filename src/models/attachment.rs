use serde::{Deserialize, Serialize};

/// Binary payload attached to a user message. Immutable once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub mime_type: String,
    pub filename: Option<String>,
    pub data: Vec<u8>,
}
