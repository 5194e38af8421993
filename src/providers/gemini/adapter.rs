use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use tokio::sync::mpsc;

use super::models::*;
use crate::providers::traits::GenerativeBackend;
use crate::providers::types::*;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiBackend {
    client: Client,
    base_url: String,
}

impl GeminiBackend {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
        }
    }

    /// Parse an API error response body into a user-friendly message.
    fn parse_error_message(status: reqwest::StatusCode, body: &str) -> String {
        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(body) {
            if let Some(msg) = parsed["error"]["message"].as_str() {
                return format!("HTTP {}: {}", status.as_u16(), msg);
            }
        }
        format!("HTTP {}: Request failed", status.as_u16())
    }

    fn build_contents(messages: &[ChatMessage]) -> Vec<GeminiContent> {
        messages
            .iter()
            .map(|msg| {
                let mut parts = Vec::new();

                // Attachment parts first
                for att in &msg.attachments {
                    let b64 = base64::engine::general_purpose::STANDARD.encode(&att.data);
                    parts.push(GeminiPart {
                        inline_data: Some(GeminiInlineData {
                            mime_type: att.mime_type.clone(),
                            data: b64,
                        }),
                        ..Default::default()
                    });
                }

                // Text part last, skipped when empty
                if !msg.content.is_empty() {
                    parts.push(GeminiPart {
                        text: Some(msg.content.clone()),
                        ..Default::default()
                    });
                }

                GeminiContent {
                    role: Some(msg.role.as_str().to_string()),
                    parts,
                }
            })
            .collect()
    }

    fn build_tools(selection: &ToolSelection) -> Option<Vec<GeminiTool>> {
        if selection.is_empty() {
            return None;
        }
        let empty = || Some(serde_json::json!({}));
        let mut tools = Vec::new();
        if selection.web_search {
            tools.push(GeminiTool {
                google_search: empty(),
                ..Default::default()
            });
        }
        if selection.code_execution {
            tools.push(GeminiTool {
                code_execution: empty(),
                ..Default::default()
            });
        }
        if selection.url_context {
            tools.push(GeminiTool {
                url_context: empty(),
                ..Default::default()
            });
        }
        Some(tools)
    }

    fn build_request(request: &GenerationRequest) -> GeminiRequest {
        let thinking_config = request.include_thoughts.then_some(GeminiThinkingConfig {
            include_thoughts: true,
        });
        let response_mime_type = request
            .json_response
            .then(|| "application/json".to_string());

        let generation_config = (thinking_config.is_some() || response_mime_type.is_some())
            .then_some(GeminiGenerationConfig {
                thinking_config,
                response_mime_type,
            });

        let system_instruction = request.system_instruction.as_ref().map(|text| GeminiContent {
            role: None,
            parts: vec![GeminiPart {
                text: Some(text.clone()),
                ..Default::default()
            }],
        });

        GeminiRequest {
            contents: Self::build_contents(&request.messages),
            system_instruction,
            generation_config,
            tools: Self::build_tools(&request.tools),
        }
    }

    /// POST the request and map HTTP-level failures onto `ProviderError`.
    async fn post(
        &self,
        url: &str,
        api_key: &str,
        body: &GeminiRequest,
    ) -> Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(ProviderError::AuthError("Invalid API key".to_string()));
        }

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited {
                retry_after_secs: None,
            });
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed(Self::parse_error_message(
                status, &body,
            )));
        }

        Ok(response)
    }
}

impl Default for GeminiBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerativeBackend for GeminiBackend {
    async fn generate(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, ProviderError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let body = Self::build_request(request);

        let response = self.post(&url, api_key, &body).await?;

        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if let Some(error) = gemini_response.error {
            return Err(ProviderError::RequestFailed(
                error.message.unwrap_or_else(|| "Unknown error".to_string()),
            ));
        }

        let candidate = gemini_response
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::InvalidResponse("No candidates".to_string()))?;

        let grounding = candidate
            .grounding_metadata
            .map(|m| m.into_grounding_info());

        let text: String = candidate
            .content
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter(|p| !p.thought.unwrap_or(false))
                    .filter_map(|p| p.text)
                    .collect()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "No content in response".to_string(),
            ));
        }

        Ok(GenerationResponse { text, grounding })
    }

    async fn stream_generate(
        &self,
        api_key: &str,
        request: &GenerationRequest,
    ) -> Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError> {
        use super::stream::parse_sse_stream;

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, request.model
        );
        let body = Self::build_request(request);

        // The stream counts as open only once the status line clears; errors
        // before this point let the caller rotate to the next key.
        let response = self.post(&url, api_key, &body).await?;

        let (tx, rx) = mpsc::channel(64);
        tokio::spawn(async move {
            parse_sse_stream(response, tx).await;
        });

        Ok(rx)
    }
}
