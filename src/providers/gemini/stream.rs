use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;

use super::models::GeminiResponse;
use crate::providers::types::{ProviderError, StreamChunk};

/// Parse a Gemini SSE response body into stream chunks.
///
/// Runs until the body ends or the receiver is dropped. A clean end sends
/// `Ok(StreamChunk::Done)`; transport failures send one `Err` and stop, which
/// the executor treats as a retryable attempt failure.
pub async fn parse_sse_stream(
    response: reqwest::Response,
    tx: mpsc::Sender<Result<StreamChunk, ProviderError>>,
) {
    let mut stream = response.bytes_stream();
    let mut byte_buf: Vec<u8> = Vec::new();
    let mut buffer = String::new();

    while let Some(chunk_result) = stream.next().await {
        let bytes: Bytes = match chunk_result {
            Ok(b) => b,
            Err(e) => {
                let _ = tx
                    .send(Err(ProviderError::StreamError(e.to_string())))
                    .await;
                return;
            }
        };

        byte_buf.extend_from_slice(&bytes);

        // Decode as much valid UTF-8 as possible from the byte buffer
        let decoded = match std::str::from_utf8(&byte_buf) {
            Ok(s) => {
                let decoded = s.to_string();
                byte_buf.clear();
                decoded
            }
            Err(e) => {
                let valid_up_to = e.valid_up_to();
                if valid_up_to == 0 {
                    // No valid UTF-8 yet, wait for more data
                    continue;
                }
                // Safety: valid_up_to is guaranteed to be valid UTF-8
                let decoded = std::str::from_utf8(&byte_buf[..valid_up_to])
                    .unwrap()
                    .to_string();
                byte_buf.drain(..valid_up_to);
                decoded
            }
        };

        // Normalize CRLF to LF (Gemini API uses \r\n line endings)
        let chunk = decoded.replace("\r\n", "\n");
        buffer.push_str(&chunk);

        // Process complete SSE events from the buffer
        while let Some(event_end) = buffer.find("\n\n") {
            let event_text = buffer[..event_end].to_string();
            buffer.drain(..event_end + 2);

            let mut data = String::new();
            for line in event_text.lines() {
                if let Some(payload) = line.strip_prefix("data: ") {
                    data.push_str(payload);
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data.push_str(payload);
                }
            }

            if data.is_empty() {
                continue;
            }

            match serde_json::from_str::<GeminiResponse>(&data) {
                Ok(response) => {
                    if let Some(error) = response.error {
                        let msg = error
                            .message
                            .unwrap_or_else(|| "Unknown error".to_string());
                        let _ = tx.send(Err(ProviderError::StreamError(msg))).await;
                        return;
                    }

                    let Some(candidate) =
                        response.candidates.and_then(|c| c.into_iter().next())
                    else {
                        continue;
                    };

                    if let Some(content) = candidate.content {
                        for part in content.parts {
                            let Some(text) = part.text else { continue };
                            let chunk = if part.thought.unwrap_or(false) {
                                StreamChunk::Thought(text)
                            } else {
                                StreamChunk::Text(text)
                            };
                            if tx.send(Ok(chunk)).await.is_err() {
                                return; // receiver dropped
                            }
                        }
                    }

                    if let Some(metadata) = candidate.grounding_metadata {
                        let info = metadata.into_grounding_info();
                        if !info.sources.is_empty() || !info.search_queries.is_empty() {
                            if tx.send(Ok(StreamChunk::Grounding(info))).await.is_err() {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to parse SSE data: {}", e);
                    // Don't abort on parse errors - partial events may occur
                }
            }
        }
    }

    let _ = tx.send(Ok(StreamChunk::Done)).await;
}
