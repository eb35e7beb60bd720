use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rate limit store request failed: {0}")]
    Transport(String),
    #[error("rate limit store returned an unexpected response: {0}")]
    Protocol(String),
}

/// Non-mutating view of one counter: current count and remaining window.
/// `ttl_secs` is `None` when the key does not exist or carries no expiry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub count: i64,
    pub ttl_secs: Option<i64>,
}

/// Atomic counter primitive backing the fixed-window limiter. The increment
/// and the expiry arm must happen in one unit of work at the store; callers
/// never read-modify-write.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increments `key` and, when the increment created the key, sets its
    /// expiry to `window_secs` in the same pipelined operation. Returns the
    /// post-increment count.
    async fn increment_with_window(&self, key: &str, window_secs: u64) -> Result<i64, StoreError>;

    /// Reads the counter without touching it. Used by info queries.
    async fn read(&self, key: &str) -> Result<CounterSnapshot, StoreError>;
}

#[async_trait]
impl CounterStore for Box<dyn CounterStore> {
    async fn increment_with_window(&self, key: &str, window_secs: u64) -> Result<i64, StoreError> {
        (**self).increment_with_window(key, window_secs).await
    }

    async fn read(&self, key: &str) -> Result<CounterSnapshot, StoreError> {
        (**self).read(key).await
    }
}

/// Process-local store for tests and single-node deployments. Keys are
/// caller-controlled, so every access drops all expired entries to keep the
/// map from growing one entry per identifier ever seen.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
}

#[derive(Clone, Copy, Debug)]
struct MemoryEntry {
    count: i64,
    expires_at: Instant,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn increment_with_window(&self, key: &str, window_secs: u64) -> Result<i64, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);

        let entry = entries
            .entry(key.to_string())
            .or_insert(MemoryEntry { count: 0, expires_at: now + Duration::from_secs(window_secs) });

        entry.count += 1;
        Ok(entry.count)
    }

    async fn read(&self, key: &str) -> Result<CounterSnapshot, StoreError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.expires_at > now);

        let snapshot = entries
            .get(key)
            .map(|entry| CounterSnapshot {
                count: entry.count,
                ttl_secs: Some((entry.expires_at - now).as_secs() as i64),
            })
            .unwrap_or_default();

        Ok(snapshot)
    }
}

fn poisoned() -> StoreError {
    StoreError::Transport("rate limit store lock poisoned".to_string())
}

/// Upstash Redis REST client. Both operations go through the `/pipeline`
/// endpoint so the increment and the expiry arm travel as one request.
pub struct UpstashStore {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl UpstashStore {
    pub fn new(
        base_url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), token })
    }

    async fn pipeline(&self, commands: Value) -> Result<Vec<Value>, StoreError> {
        let response = self
            .client
            .post(format!("{}/pipeline", self.base_url))
            .bearer_auth(self.token.expose_secret())
            .json(&commands)
            .send()
            .await
            .map_err(|error| StoreError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Transport(format!("pipeline request returned {status}")));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|error| StoreError::Protocol(error.to_string()))?;

        parse_pipeline_results(&body)
    }
}

#[async_trait]
impl CounterStore for UpstashStore {
    async fn increment_with_window(&self, key: &str, window_secs: u64) -> Result<i64, StoreError> {
        // EXPIRE ... NX arms the window only when the key has no expiry yet,
        // i.e. exactly when this INCR created it.
        let commands = json!([
            ["INCR", key],
            ["EXPIRE", key, window_secs, "NX"],
        ]);

        let results = self.pipeline(commands).await?;
        let count = results
            .first()
            .and_then(Value::as_i64)
            .ok_or_else(|| StoreError::Protocol("INCR result missing".to_string()))?;

        debug!(key, count, "rate limit counter incremented");
        Ok(count)
    }

    async fn read(&self, key: &str) -> Result<CounterSnapshot, StoreError> {
        let commands = json!([["GET", key], ["TTL", key]]);
        let results = self.pipeline(commands).await?;

        let count = match results.first() {
            Some(Value::Null) | None => 0,
            Some(Value::String(raw)) => raw
                .parse()
                .map_err(|_| StoreError::Protocol(format!("GET returned non-integer `{raw}`")))?,
            Some(value) => value
                .as_i64()
                .ok_or_else(|| StoreError::Protocol(format!("GET returned {value}")))?,
        };

        let ttl = results.get(1).and_then(Value::as_i64).filter(|ttl| *ttl >= 0);
        Ok(CounterSnapshot { count, ttl_secs: ttl })
    }
}

/// Upstash wraps each pipeline step as `{"result": ...}` or `{"error": ...}`.
fn parse_pipeline_results(body: &Value) -> Result<Vec<Value>, StoreError> {
    let steps = body
        .as_array()
        .ok_or_else(|| StoreError::Protocol(format!("expected pipeline array, got {body}")))?;

    steps
        .iter()
        .map(|step| {
            if let Some(error) = step.get("error").and_then(Value::as_str) {
                return Err(StoreError::Protocol(error.to_string()));
            }
            step.get("result")
                .cloned()
                .ok_or_else(|| StoreError::Protocol(format!("pipeline step missing result: {step}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_pipeline_results, CounterStore, MemoryStore, StoreError};

    #[tokio::test]
    async fn memory_store_counts_and_expires() {
        let store = MemoryStore::new();

        assert_eq!(store.increment_with_window("chat:1.2.3.4", 1).await.unwrap(), 1);
        assert_eq!(store.increment_with_window("chat:1.2.3.4", 1).await.unwrap(), 2);

        let snapshot = store.read("chat:1.2.3.4").await.unwrap();
        assert_eq!(snapshot.count, 2);
        assert!(snapshot.ttl_secs.is_some());

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        assert_eq!(store.increment_with_window("chat:1.2.3.4", 1).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn memory_store_keys_are_independent() {
        let store = MemoryStore::new();
        store.increment_with_window("chat:a", 60).await.unwrap();
        store.increment_with_window("chat:a", 60).await.unwrap();
        store.increment_with_window("chat:b", 60).await.unwrap();

        assert_eq!(store.read("chat:a").await.unwrap().count, 2);
        assert_eq!(store.read("chat:b").await.unwrap().count, 1);
    }

    #[tokio::test]
    async fn expired_entries_are_evicted_on_access() {
        let store = MemoryStore::new();
        store.increment_with_window("chat:stale-a", 1).await.unwrap();
        store.increment_with_window("chat:stale-b", 1).await.unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;
        store.increment_with_window("chat:fresh", 60).await.unwrap();

        let entries = store.entries.lock().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries.contains_key("chat:fresh"));
    }

    #[tokio::test]
    async fn missing_key_reads_as_zero_without_ttl() {
        let store = MemoryStore::new();
        let snapshot = store.read("chat:unseen").await.unwrap();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.ttl_secs, None);
    }

    #[test]
    fn pipeline_results_unwrap_result_envelopes() {
        let body = json!([{ "result": 3 }, { "result": 1 }]);
        let results = parse_pipeline_results(&body).expect("parses");
        assert_eq!(results[0].as_i64(), Some(3));
        assert_eq!(results[1].as_i64(), Some(1));
    }

    #[test]
    fn pipeline_step_error_is_a_protocol_error() {
        let body = json!([{ "error": "WRONGTYPE" }]);
        let error = parse_pipeline_results(&body).expect_err("must fail");
        assert!(matches!(error, StoreError::Protocol(_)));
    }
}
