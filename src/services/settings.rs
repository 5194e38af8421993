use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::storage::KeyValueStore;

const SETTINGS_KEY: &str = "app_settings";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    /// API keys rotated across requests.
    #[serde(default)]
    pub api_keys: Vec<String>,
    pub default_model: String,
    /// Model used for side calls (auto-title, suggested replies).
    pub utility_model: String,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub system_prompt_enabled: bool,
    /// Register web search on every call unless a tool conflict drops it.
    #[serde(default)]
    pub default_web_search: bool,
    /// Adds the conservative search-steering directive when search is only
    /// on by default, not explicitly requested.
    #[serde(default)]
    pub optimize_prompts: bool,
    /// Adds the output-formatting directive to the system instruction.
    #[serde(default)]
    pub optimize_formatting: bool,
    /// Ask the provider to stream internal reasoning as thought deltas.
    #[serde(default)]
    pub show_thoughts: bool,
    /// Fire a best-effort suggested-replies call after each completion.
    #[serde(default)]
    pub suggest_replies: bool,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            default_model: "gemini-2.5-flash".to_string(),
            utility_model: "gemini-2.5-flash-lite".to_string(),
            system_prompt: None,
            system_prompt_enabled: false,
            default_web_search: false,
            optimize_prompts: false,
            optimize_formatting: false,
            show_thoughts: false,
            suggest_replies: false,
        }
    }
}

pub struct SettingsService;

impl SettingsService {
    pub async fn load(store: &Arc<dyn KeyValueStore>) -> AppSettings {
        match store.get(SETTINGS_KEY).await {
            Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_default(),
            _ => AppSettings::default(),
        }
    }

    pub async fn save(store: &Arc<dyn KeyValueStore>, settings: &AppSettings) -> Result<()> {
        let json = serde_json::to_string(settings)?;
        store.set(SETTINGS_KEY, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::MemoryStore;

    #[tokio::test]
    async fn missing_settings_fall_back_to_defaults() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let settings = SettingsService::load(&store).await;
        assert_eq!(settings.default_model, "gemini-2.5-flash");
        assert!(!settings.suggest_replies);
    }

    #[tokio::test]
    async fn settings_round_trip() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let mut settings = AppSettings::default();
        settings.api_keys = vec!["k1".into(), "k2".into()];
        settings.suggest_replies = true;

        SettingsService::save(&store, &settings).await.unwrap();
        let loaded = SettingsService::load(&store).await;
        assert_eq!(loaded.api_keys, vec!["k1", "k2"]);
        assert!(loaded.suggest_replies);
    }
}
