use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::warn;

use crate::store::{CounterStore, StoreError};

const KEY_PREFIX: &str = "chat:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub total: u32,
    pub remaining: u32,
    /// Seconds until the current window expires; zero when no window is open.
    pub reset_secs: i64,
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit of {limit} requests exceeded, resets at {reset_at}")]
    Exceeded { limit: u32, reset_at: DateTime<Utc> },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Fixed-window limiter over an atomic counter store. Windows reset fully at
/// the boundary, so bursts straddling two windows are accepted by design.
pub struct RateLimiter<S> {
    store: S,
    limit: u32,
    window_secs: u64,
}

impl<S> RateLimiter<S>
where
    S: CounterStore,
{
    pub fn new(store: S, limit: u32, window_secs: u64) -> Self {
        Self { store, limit, window_secs }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Counts this request against `identifier`'s window. The increment is
    /// never rolled back on rejection: the window already recorded the
    /// attempt. `reset_at` is an approximation (`now + window`); the true
    /// reset time is the stored TTL, available through [`Self::info`].
    pub async fn check(&self, identifier: &str) -> Result<RateLimitDecision, RateLimitError> {
        let key = window_key(identifier);
        let count = self.store.increment_with_window(&key, self.window_secs).await?;
        let reset_at = Utc::now() + Duration::seconds(self.window_secs as i64);
        let remaining = i64::from(self.limit) - count;

        if remaining < 0 {
            warn!(identifier, count, limit = self.limit, "rate limit exceeded");
            return Err(RateLimitError::Exceeded { limit: self.limit, reset_at });
        }

        Ok(RateLimitDecision { limit: self.limit, remaining: remaining as u32, reset_at })
    }

    /// Read-only view of the current window. Does not count as a request.
    pub async fn info(&self, identifier: &str) -> Result<RateLimitInfo, RateLimitError> {
        let snapshot = self.store.read(&window_key(identifier)).await?;
        let remaining = (i64::from(self.limit) - snapshot.count).max(0) as u32;

        Ok(RateLimitInfo {
            total: self.limit,
            remaining,
            reset_secs: snapshot.ttl_secs.unwrap_or(0),
        })
    }
}

fn window_key(identifier: &str) -> String {
    format!("{KEY_PREFIX}{identifier}")
}

#[cfg(test)]
mod tests {
    use crate::store::MemoryStore;

    use super::{RateLimitError, RateLimiter};

    #[tokio::test]
    async fn three_checks_against_limit_of_two() {
        let limiter = RateLimiter::new(MemoryStore::new(), 2, 3600);

        let first = limiter.check("203.0.113.9").await.expect("first check passes");
        assert_eq!(first.remaining, 1);

        let second = limiter.check("203.0.113.9").await.expect("second check passes");
        assert_eq!(second.remaining, 0);

        let third = limiter.check("203.0.113.9").await.expect_err("third check fails");
        assert!(matches!(third, RateLimitError::Exceeded { limit: 2, .. }));
    }

    #[tokio::test]
    async fn rejected_increment_is_not_rolled_back() {
        let limiter = RateLimiter::new(MemoryStore::new(), 1, 3600);
        limiter.check("client").await.expect("first check passes");
        let _ = limiter.check("client").await.expect_err("second check fails");

        // The rejected attempt stayed in the window: remaining is pinned at
        // zero rather than bouncing back to one.
        let info = limiter.info("client").await.expect("info reads");
        assert_eq!(info.remaining, 0);
        assert_eq!(info.total, 1);
        assert!(info.reset_secs > 0);
    }

    #[tokio::test]
    async fn window_expiry_starts_a_fresh_count() {
        let limiter = RateLimiter::new(MemoryStore::new(), 1, 1);
        limiter.check("client").await.expect("first check passes");
        let _ = limiter.check("client").await.expect_err("window is full");

        tokio::time::sleep(std::time::Duration::from_millis(1100)).await;

        let decision = limiter.check("client").await.expect("new window admits");
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test]
    async fn info_on_unseen_identifier_reports_full_budget() {
        let limiter = RateLimiter::new(MemoryStore::new(), 5, 3600);
        let info = limiter.info("never-seen").await.expect("info reads");
        assert_eq!(info.remaining, 5);
        assert_eq!(info.reset_secs, 0);
    }

    #[tokio::test]
    async fn identifiers_do_not_share_windows() {
        let limiter = RateLimiter::new(MemoryStore::new(), 1, 3600);
        limiter.check("first").await.expect("first identifier passes");
        limiter.check("second").await.expect("second identifier passes");
    }
}
