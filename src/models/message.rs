use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::attachment::Attachment;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "model" => Some(Role::Model),
            _ => None,
        }
    }
}

/// Web source cited by a grounded (search-backed) response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub uri: String,
    pub title: Option<String>,
}

/// Citation metadata attached to a model message once its stream completes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingInfo {
    pub sources: Vec<GroundingSource>,
    pub search_queries: Vec<String>,
}

/// A single conversation turn.
///
/// User messages are created complete and never touched again. Model messages
/// start as a pending placeholder and are mutated in place while streaming;
/// `pending` drops to `false` on completion, failure, or cancellation, after
/// which the message is frozen except for an explicit user edit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thoughts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<GroundingInfo>,
    pub pending: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>, attachments: Vec<Attachment>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            content: content.into(),
            attachments,
            thoughts: None,
            grounding: None,
            pending: false,
            created_at: Utc::now(),
        }
    }

    /// Empty model message used as the streaming target.
    pub fn placeholder() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::Model,
            content: String::new(),
            attachments: Vec::new(),
            thoughts: None,
            grounding: None,
            pending: true,
            created_at: Utc::now(),
        }
    }
}
