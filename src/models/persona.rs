use serde::{Deserialize, Serialize};

/// A reusable assistant profile: a system prompt plus default tool toggles
/// applied to every generation in a conversation that references it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    pub icon: Option<String>,
    pub system_prompt: String,
    #[serde(default)]
    pub web_search: bool,
    #[serde(default)]
    pub code_execution: bool,
    #[serde(default)]
    pub url_context: bool,
}

impl Persona {
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            icon: None,
            system_prompt: system_prompt.into(),
            web_search: false,
            code_execution: false,
            url_context: false,
        }
    }
}
