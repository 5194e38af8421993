use std::sync::Arc;

use serde::Deserialize;

use super::executor::execute;
use super::keys::KeyRotation;
use crate::models::Role;
use crate::providers::traits::GenerativeBackend;
use crate::providers::types::{ChatMessage, GenerationRequest, ToolSelection};

/// Best-effort helper calls fired around the main generation: conversation
/// auto-titling and suggested replies. Both go through the same key rotation
/// as the primary flow, expect a small JSON body back, and degrade to a
/// default on any failure. Nothing here may block or fail a send.

#[derive(Debug, Deserialize)]
struct TitlePayload {
    title: String,
}

fn json_request(model: &str, prompt: String) -> GenerationRequest {
    GenerationRequest {
        model: model.to_string(),
        messages: vec![ChatMessage {
            role: Role::User,
            content: prompt,
            attachments: Vec::new(),
        }],
        system_instruction: None,
        tools: ToolSelection::default(),
        include_thoughts: false,
        json_response: true,
    }
}

fn parse_title(body: &str) -> Option<String> {
    let payload: TitlePayload = serde_json::from_str(body).ok()?;
    let title = payload.title.trim().to_string();
    (!title.is_empty()).then_some(title)
}

fn parse_suggestions(body: &str) -> Vec<String> {
    let items: Vec<String> = serde_json::from_str(body).unwrap_or_default();
    items
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(4)
        .collect()
}

/// Produce a short conversation title from the opening message. `None` on any
/// failure; the caller keeps its provisional text-prefix title.
pub async fn generate_title(
    backend: &Arc<dyn GenerativeBackend>,
    keys: &KeyRotation,
    model: &str,
    first_message: &str,
) -> Option<String> {
    let prompt = format!(
        "Write a title of at most five words for a conversation that starts with \
         the following message. Respond with a JSON object of the form \
         {{\"title\": \"...\"}} and nothing else.\n\nMessage:\n{}",
        first_message
    );
    let request = json_request(model, prompt);

    match execute(keys, |key| {
        let request = request.clone();
        let backend = backend.clone();
        async move { backend.generate(&key, &request).await }
    })
    .await
    {
        Ok(response) => {
            let title = parse_title(&response.text);
            if title.is_none() {
                tracing::warn!("Auto-title response was not the expected JSON shape");
            }
            title
        }
        Err(e) => {
            tracing::warn!("Auto-title call failed: {}", e);
            None
        }
    }
}

/// Produce 3-4 short reply suggestions for the finished exchange. Empty on
/// any failure.
pub async fn suggest_replies(
    backend: &Arc<dyn GenerativeBackend>,
    keys: &KeyRotation,
    model: &str,
    user_text: &str,
    model_text: &str,
) -> Vec<String> {
    let prompt = format!(
        "Given this exchange, propose 3 or 4 short replies the user might send \
         next. Each must be under ten words. Respond with a JSON array of strings \
         and nothing else.\n\nUser:\n{}\n\nAssistant:\n{}",
        user_text, model_text
    );
    let request = json_request(model, prompt);

    match execute(keys, |key| {
        let request = request.clone();
        let backend = backend.clone();
        async move { backend.generate(&key, &request).await }
    })
    .await
    {
        Ok(response) => parse_suggestions(&response.text),
        Err(e) => {
            tracing::warn!("Suggested-replies call failed: {}", e);
            Vec::new()
        }
    }
}

/// Truncate text to a short provisional title.
pub fn truncate_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    if first_line.len() > 50 {
        let boundary = first_line
            .char_indices()
            .take_while(|(i, _)| *i < 47)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(47);
        format!("{}...", &first_line[..boundary])
    } else {
        first_line.to_string()
    }
}
