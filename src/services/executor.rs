use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use super::keys::{mask_key, KeyRotation};
use crate::models::GroundingInfo;
use crate::providers::types::{ProviderError, StreamChunk};

#[derive(Debug, Error)]
pub enum ExecuteError {
    #[error("No API keys configured")]
    NoKeys,

    #[error("All {attempts} API keys failed: {source}")]
    AllKeysFailed {
        attempts: usize,
        #[source]
        source: ProviderError,
    },
}

/// Events delivered to the streaming consumer.
///
/// `Opened` fires once per successful attempt. A mid-stream transport failure
/// triggers a fresh attempt on the next key, so a consumer can see `Opened`
/// more than once; chunks already delivered are never retracted, and `Opened`
/// is the signal to throw away partial accumulation and start over.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    Opened,
    Text(String),
    Thought(String),
    Grounding(GroundingInfo),
    Done,
    /// Sentinel: every key failed. Always the last event of its channel, and
    /// the only event on an empty pool.
    Failed(String),
}

/// Run a single-shot operation, rotating through the key pool until one key
/// succeeds or the pool is exhausted.
pub async fn execute<T, F, Fut>(keys: &KeyRotation, op: F) -> Result<T, ExecuteError>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    if keys.is_empty() {
        return Err(ExecuteError::NoKeys);
    }

    let total = keys.len();
    let mut last_err: Option<ProviderError> = None;

    for attempt in 1..=total {
        let Some((key, _)) = keys.next() else { break };
        match op(key.clone()).await {
            Ok(value) => {
                keys.confirm_success().await;
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(
                    attempt,
                    total,
                    key = %mask_key(&key),
                    "API call failed: {}",
                    e
                );
                last_err = Some(e);
            }
        }
    }

    Err(ExecuteError::AllKeysFailed {
        attempts: total,
        source: last_err
            .unwrap_or_else(|| ProviderError::RequestFailed("No attempt was made".to_string())),
    })
}

/// Run a streaming operation with the same rotation algorithm, forwarding
/// chunks lazily as they arrive.
///
/// `op(key)` must resolve to a chunk receiver only once the stream is
/// confirmed open; failures before that point rotate to the next key, as do
/// mid-stream transport failures (a fresh call from scratch, never a resume).
/// Terminal conditions are represented in-band: pool exhaustion and the empty
/// pool both end the sequence with a single `StreamEvent::Failed`, never a
/// panic, because a stream consumer expects a sequence, not an exception.
pub fn execute_stream<F, Fut>(keys: Arc<KeyRotation>, op: F) -> mpsc::Receiver<StreamEvent>
where
    F: Fn(String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<mpsc::Receiver<Result<StreamChunk, ProviderError>>, ProviderError>>
        + Send,
{
    let (tx, rx) = mpsc::channel(64);

    tokio::spawn(async move {
        if keys.is_empty() {
            let _ = tx
                .send(StreamEvent::Failed("No API keys configured".to_string()))
                .await;
            return;
        }

        let total = keys.len();
        let mut last_err: Option<ProviderError> = None;

        'attempts: for attempt in 1..=total {
            let Some((key, _)) = keys.next() else { break };

            let mut chunk_rx = match op(key.clone()).await {
                Ok(chunk_rx) => chunk_rx,
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        total,
                        key = %mask_key(&key),
                        "Failed to open stream: {}",
                        e
                    );
                    last_err = Some(e);
                    continue;
                }
            };

            // Stream confirmed open
            keys.confirm_success().await;
            if tx.send(StreamEvent::Opened).await.is_err() {
                return; // consumer gone
            }

            loop {
                match chunk_rx.recv().await {
                    Some(Ok(StreamChunk::Done)) => {
                        let _ = tx.send(StreamEvent::Done).await;
                        return;
                    }
                    Some(Ok(chunk)) => {
                        let event = match chunk {
                            StreamChunk::Text(t) => StreamEvent::Text(t),
                            StreamChunk::Thought(t) => StreamEvent::Thought(t),
                            StreamChunk::Grounding(g) => StreamEvent::Grounding(g),
                            StreamChunk::Done => unreachable!(),
                        };
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        tracing::warn!(
                            attempt,
                            total,
                            key = %mask_key(&key),
                            "Stream failed mid-consumption: {}",
                            e
                        );
                        last_err = Some(e);
                        continue 'attempts;
                    }
                    None => {
                        tracing::warn!(
                            attempt,
                            total,
                            key = %mask_key(&key),
                            "Stream closed without completing"
                        );
                        last_err = Some(ProviderError::StreamError(
                            "Stream ended unexpectedly".to_string(),
                        ));
                        continue 'attempts;
                    }
                }
            }
        }

        let detail = last_err
            .map(|e| e.to_string())
            .unwrap_or_else(|| "No attempt was made".to_string());
        let _ = tx
            .send(StreamEvent::Failed(format!(
                "All {} API keys failed: {}",
                total, detail
            )))
            .await;
    });

    rx
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use super::*;
    use crate::services::storage::MemoryStore;

    async fn pool(keys: &[&str]) -> Arc<KeyRotation> {
        let store = Arc::new(MemoryStore::new());
        Arc::new(KeyRotation::load(keys.iter().copied(), store).await)
    }

    fn chunk_stream(
        items: Vec<Result<StreamChunk, ProviderError>>,
    ) -> mpsc::Receiver<Result<StreamChunk, ProviderError>> {
        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(async move {
            for item in items {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    async fn collect(mut rx: mpsc::Receiver<StreamEvent>) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn execute_returns_first_success() {
        let keys = pool(&["a", "b"]).await;
        let result = execute(&keys, |key| async move { Ok::<_, ProviderError>(key) }).await;
        assert_eq!(result.unwrap(), "a");
    }

    #[tokio::test]
    async fn execute_rotates_past_failing_keys() {
        let keys = pool(&["a", "b", "c"]).await;
        let result = execute(&keys, |key| async move {
            if key == "c" {
                Ok(key)
            } else {
                Err(ProviderError::RequestFailed(format!("{} is down", key)))
            }
        })
        .await;
        assert_eq!(result.unwrap(), "c");
    }

    #[tokio::test]
    async fn execute_reports_no_keys_on_empty_pool() {
        let keys = pool(&[]).await;
        let result = execute(&keys, |key| async move { Ok::<_, ProviderError>(key) }).await;
        assert!(matches!(result, Err(ExecuteError::NoKeys)));
    }

    #[tokio::test]
    async fn execute_surfaces_final_error_after_exhaustion() {
        let keys = pool(&["a", "b"]).await;
        let result: Result<(), _> = execute(&keys, |key| async move {
            Err(ProviderError::RequestFailed(format!("{} is down", key)))
        })
        .await;
        match result {
            Err(ExecuteError::AllKeysFailed { attempts, source }) => {
                assert_eq!(attempts, 2);
                assert!(source.to_string().contains("b is down"));
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn success_persists_rotation_cursor() {
        let store = Arc::new(MemoryStore::new());
        let keys = Arc::new(KeyRotation::load(["a", "b", "c"], store.clone()).await);
        let _ = execute(&keys, |key| async move {
            if key == "b" {
                Ok(())
            } else {
                Err(ProviderError::RequestFailed("down".to_string()))
            }
        })
        .await;

        // A fresh pool over the same store starts one past "b"
        let reloaded = KeyRotation::load(["a", "b", "c"], store).await;
        assert_eq!(reloaded.next().unwrap().0, "c");
    }

    #[tokio::test]
    async fn stream_skips_failed_keys_and_forwards_winner() {
        let keys = pool(&["a", "b", "c"]).await;
        let rx = execute_stream(keys, |key| async move {
            if key == "c" {
                Ok(chunk_stream(vec![
                    Ok(StreamChunk::Text("hello ".to_string())),
                    Ok(StreamChunk::Text("world".to_string())),
                    Ok(StreamChunk::Done),
                ]))
            } else {
                Err(ProviderError::AuthError("bad key".to_string()))
            }
        });

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Opened,
                StreamEvent::Text("hello ".to_string()),
                StreamEvent::Text("world".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn stream_retries_from_scratch_on_midstream_failure() {
        let keys = pool(&["a", "b"]).await;
        let rx = execute_stream(keys, |key| async move {
            if key == "a" {
                Ok(chunk_stream(vec![
                    Ok(StreamChunk::Text("partial".to_string())),
                    Err(ProviderError::StreamError("connection reset".to_string())),
                ]))
            } else {
                Ok(chunk_stream(vec![
                    Ok(StreamChunk::Text("complete".to_string())),
                    Ok(StreamChunk::Done),
                ]))
            }
        });

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Opened,
                StreamEvent::Text("partial".to_string()),
                StreamEvent::Opened,
                StreamEvent::Text("complete".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn stream_exhaustion_yields_exactly_one_sentinel() {
        let keys = pool(&["a", "b"]).await;
        let rx = execute_stream(keys, |key| async move {
            Err::<mpsc::Receiver<Result<StreamChunk, ProviderError>>, _>(
                ProviderError::RequestFailed(format!("{} is down", key)),
            )
        });

        let events = collect(rx).await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::Failed(msg) => {
                assert!(msg.contains("All 2 API keys failed"));
                assert!(msg.contains("b is down"));
            }
            other => panic!("expected sentinel, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stream_with_empty_pool_yields_exactly_one_sentinel() {
        let keys = pool(&[]).await;
        let rx = execute_stream(keys, |_key| async move {
            Ok(chunk_stream(vec![Ok(StreamChunk::Done)]))
        });

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![StreamEvent::Failed("No API keys configured".to_string())]
        );
    }

    #[tokio::test]
    async fn stream_counts_truncated_stream_as_attempt_failure() {
        // Channel closes without Done: retry, then succeed.
        let keys = pool(&["a", "b"]).await;
        let rx = execute_stream(keys, |key| async move {
            if key == "a" {
                Ok(chunk_stream(vec![Ok(StreamChunk::Text("x".to_string()))]))
            } else {
                Ok(chunk_stream(vec![
                    Ok(StreamChunk::Text("y".to_string())),
                    Ok(StreamChunk::Done),
                ]))
            }
        });

        let events = collect(rx).await;
        assert_eq!(
            events,
            vec![
                StreamEvent::Opened,
                StreamEvent::Text("x".to_string()),
                StreamEvent::Opened,
                StreamEvent::Text("y".to_string()),
                StreamEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn fail_once_then_succeed_pattern_lands_on_retry() {
        // Both keys fail their first use; a later fresh call succeeds.
        let failures: Arc<Mutex<HashMap<String, u32>>> = Arc::new(Mutex::new(HashMap::new()));
        let keys = pool(&["a", "b"]).await;

        let run = |keys: Arc<KeyRotation>, failures: Arc<Mutex<HashMap<String, u32>>>| {
            execute_stream(keys, move |key| {
                let failures = failures.clone();
                async move {
                    let mut seen = failures.lock().unwrap();
                    let count = seen.entry(key.clone()).or_insert(0);
                    *count += 1;
                    if *count == 1 {
                        Err(ProviderError::RateLimited {
                            retry_after_secs: None,
                        })
                    } else {
                        Ok(chunk_stream(vec![
                            Ok(StreamChunk::Text(format!("from {}", key))),
                            Ok(StreamChunk::Done),
                        ]))
                    }
                }
            })
        };

        // First generation exhausts both keys once each
        let events = collect(run(keys.clone(), failures.clone())).await;
        assert!(matches!(events.as_slice(), [StreamEvent::Failed(_)]));

        // Second generation succeeds on its first attempt
        let events = collect(run(keys, failures)).await;
        assert_eq!(events[0], StreamEvent::Opened);
        assert!(matches!(&events[1], StreamEvent::Text(t) if t.starts_with("from ")));
        assert_eq!(events[2], StreamEvent::Done);
    }
}
