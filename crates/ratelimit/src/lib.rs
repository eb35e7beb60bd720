pub mod limiter;
pub mod store;

pub use limiter::{RateLimitDecision, RateLimitError, RateLimitInfo, RateLimiter};
pub use store::{CounterSnapshot, CounterStore, MemoryStore, StoreError, UpstashStore};
