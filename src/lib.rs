//! quotegate library
//!
//! A bounded, rate-limited, retrying cache-aside client for stock market data
//! APIs. Callers ask a `FetchCoordinator` for a key; it answers from the
//! `ResponseCache` when it can and otherwise calls the upstream through the
//! `ConcurrencyLimiter` and `RetryPolicy`.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod limiter;
pub mod retry;
pub mod upstream;

pub use cache::{CacheEntry, CacheSnapshot, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError, FetchConfig};
pub use coordinator::{FetchAttempt, FetchCoordinator, FetchError, FetchReport, FetchStats};
pub use limiter::{ConcurrencyLimiter, LimiterError, LimiterSlot};
pub use retry::{AttemptOutcome, RetryDecision, RetryPolicy};
pub use upstream::{AlphaVantageClient, Payload, RawOutcome, UpstreamClient};
