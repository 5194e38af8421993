use std::sync::{Arc, Mutex};

use crate::services::storage::KeyValueStore;

/// Storage key for the persisted rotation cursor.
const CURSOR_KEY: &str = "key_rotation_cursor";

/// Round-robin API key pool with a durable cursor.
///
/// The cursor records the last index handed out, so rotation resumes one past
/// the last successful key across process restarts instead of hammering key 0
/// on every launch. The manager itself never fails: an empty pool is a valid
/// state that `next()` reports as `None`.
pub struct KeyRotation {
    keys: Vec<String>,
    cursor: Mutex<Option<usize>>,
    store: Arc<dyn KeyValueStore>,
}

impl KeyRotation {
    /// Build a pool from raw key strings, dropping blanks and duplicates,
    /// and restore the persisted cursor if it still points into the pool.
    pub async fn load<I, S>(raw_keys: I, store: Arc<dyn KeyValueStore>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = Vec::new();
        for key in raw_keys {
            let key = key.into().trim().to_string();
            if !key.is_empty() && !keys.contains(&key) {
                keys.push(key);
            }
        }

        let cursor = match store.get(CURSOR_KEY).await {
            Ok(Some(raw)) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|idx| *idx < keys.len()),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!("Failed to load key rotation cursor: {}", e);
                None
            }
        };

        Self {
            keys,
            cursor: Mutex::new(cursor),
            store,
        }
    }

    /// Advance the cursor one position and return the key there, with its
    /// index. `None` when the pool is empty.
    pub fn next(&self) -> Option<(String, usize)> {
        if self.keys.is_empty() {
            return None;
        }
        let mut cursor = self.cursor.lock().unwrap();
        let idx = match *cursor {
            Some(last) => (last + 1) % self.keys.len(),
            None => 0,
        };
        *cursor = Some(idx);
        Some((self.keys[idx].clone(), idx))
    }

    /// Durably record the cursor as the new starting point. Call only after
    /// the wrapped operation fully succeeded (for streams, once the stream is
    /// confirmed open). Persistence failures are logged, never surfaced: the
    /// cursor is a load-spreading hint, not correctness-critical state.
    pub async fn confirm_success(&self) {
        let idx = *self.cursor.lock().unwrap();
        let Some(idx) = idx else { return };
        if let Err(e) = self.store.set(CURSOR_KEY, &idx.to_string()).await {
            tracing::warn!("Failed to persist key rotation cursor: {}", e);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Render only the tail of a key for logs.
pub fn mask_key(key: &str) -> String {
    let suffix: String = key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("...{}", suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::storage::MemoryStore;

    #[tokio::test]
    async fn visits_every_key_once_per_cycle() {
        let store = Arc::new(MemoryStore::new());
        let pool = KeyRotation::load(["a", "b", "c"], store).await;

        let mut seen: Vec<usize> = (0..pool.len())
            .map(|_| pool.next().unwrap().1)
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2]);

        // Next cycle wraps back to the start of the order, not a reshuffle
        assert_eq!(pool.next().unwrap().1, 0);
    }

    #[tokio::test]
    async fn resumes_one_past_persisted_cursor() {
        let store = Arc::new(MemoryStore::new());

        let pool = KeyRotation::load(["a", "b", "c"], store.clone()).await;
        pool.next();
        pool.next(); // cursor at index 1
        pool.confirm_success().await;

        let reloaded = KeyRotation::load(["a", "b", "c"], store).await;
        let (key, idx) = reloaded.next().unwrap();
        assert_eq!(idx, 2);
        assert_eq!(key, "c");
    }

    #[tokio::test]
    async fn stale_cursor_from_shrunk_pool_is_discarded() {
        let store = Arc::new(MemoryStore::new());
        let pool = KeyRotation::load(["a", "b", "c"], store.clone()).await;
        pool.next();
        pool.next();
        pool.next(); // cursor at index 2
        pool.confirm_success().await;

        let shrunk = KeyRotation::load(["a", "b"], store).await;
        assert_eq!(shrunk.next().unwrap().1, 0);
    }

    #[tokio::test]
    async fn empty_pool_yields_none() {
        let store = Arc::new(MemoryStore::new());
        let pool = KeyRotation::load(Vec::<String>::new(), store).await;
        assert!(pool.is_empty());
        assert!(pool.next().is_none());
        // confirm on an unset cursor is a no-op
        pool.confirm_success().await;
    }

    #[tokio::test]
    async fn blanks_and_duplicates_are_dropped() {
        let store = Arc::new(MemoryStore::new());
        let pool = KeyRotation::load(["a", "", "  ", "a", "b"], store).await;
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn mask_key_keeps_only_the_tail() {
        assert_eq!(mask_key("sk-abcdef1234"), "...1234");
        assert_eq!(mask_key("ab"), "...ab");
    }
}
