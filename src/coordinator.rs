//! Cache-aside fetch orchestration
//!
//! `FetchCoordinator` ties the pieces together for one logical fetch:
//! cache lookup, limiter slot, retrying upstream attempts, cache fill, slot
//! release. Each fetch is its own async pipeline; the only places it waits
//! are slot acquisition and backoff sleeps, and neither holds up other
//! fetches.
//!
//! The slot is held for the whole retry sequence of a fetch, so the limiter
//! bounds upstream pressure including retries. The slot is an owned guard,
//! so it is returned on every exit path: success, give-up, a panicking
//! upstream call, or the fetch future being dropped.

use futures::future::join_all;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::cache::ResponseCache;
use crate::config::{ConfigError, FetchConfig};
use crate::limiter::{ConcurrencyLimiter, LimiterError};
use crate::retry::{AttemptOutcome, Failure, GiveUpReason, RetryDecision, RetryPolicy};
use crate::upstream::{Payload, UpstreamClient};

/// Terminal failure of a fetch
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Every allowed attempt failed transiently
    #[error("retries exhausted after {attempts} attempts, last error: {last_reason}")]
    RetriesExhausted { attempts: u32, last_reason: String },

    /// The upstream rejected the request in a way retrying cannot fix
    #[error("permanent upstream failure: {0}")]
    Permanent(String),

    /// The caller abandoned the fetch
    #[error("fetch cancelled")]
    Cancelled,

    /// The limiter could not hand out a slot
    #[error("concurrency limiter misuse: {0}")]
    LimiterMisuse(#[from] LimiterError),
}

impl From<GiveUpReason> for FetchError {
    fn from(reason: GiveUpReason) -> Self {
        match reason {
            GiveUpReason::RetriesExhausted {
                attempts,
                last_reason,
            } => FetchError::RetriesExhausted {
                attempts,
                last_reason,
            },
            GiveUpReason::Permanent(reason) => FetchError::Permanent(reason),
        }
    }
}

/// Record of one upstream attempt within a fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub key: String,
    /// 1-based attempt number
    pub attempt_number: u32,
    pub outcome: AttemptOutcome<Payload>,
    /// Backoff waited after this attempt, if another attempt followed
    pub backoff: Option<Duration>,
}

/// Everything known about one completed fetch
#[derive(Debug, Clone)]
pub struct FetchReport {
    pub key: String,
    pub result: Result<Payload, FetchError>,
    /// Upstream attempts in order; empty for cache hits
    pub attempts: Vec<FetchAttempt>,
    /// Whether the payload was served from cache
    pub from_cache: bool,
    /// Wall time from the start of the fetch to its result
    pub elapsed: Duration,
}

/// Point-in-time copy of coordinator counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_attempts: u64,
    pub retries: u64,
    pub successes: u64,
    pub failures: u64,
    pub cancelled: u64,
}

#[derive(Debug, Default)]
struct Counters {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    upstream_attempts: AtomicU64,
    retries: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    cancelled: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> FetchStats {
        FetchStats {
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_attempts: self.upstream_attempts.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
        }
    }
}

/// Mediates caller demand against a rate-limited upstream
///
/// Cheap to clone; clones share the cache, limiter, upstream and counters.
pub struct FetchCoordinator<U: ?Sized> {
    cache: Arc<ResponseCache>,
    limiter: Arc<ConcurrencyLimiter>,
    upstream: Arc<U>,
    policy: RetryPolicy,
    cache_ttl: Duration,
    attempt_timeout: Duration,
    counters: Arc<Counters>,
}

impl<U: ?Sized> Clone for FetchCoordinator<U> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            limiter: self.limiter.clone(),
            upstream: self.upstream.clone(),
            policy: self.policy.clone(),
            cache_ttl: self.cache_ttl,
            attempt_timeout: self.attempt_timeout,
            counters: self.counters.clone(),
        }
    }
}

impl<U: ?Sized> std::fmt::Debug for FetchCoordinator<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("policy", &self.policy)
            .field("cache_ttl", &self.cache_ttl)
            .field("attempt_timeout", &self.attempt_timeout)
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl<U: UpstreamClient + ?Sized> FetchCoordinator<U> {
    /// Creates a coordinator with its own cache and limiter
    pub fn new(upstream: Arc<U>, config: &FetchConfig) -> Result<Self, ConfigError> {
        let cache = Arc::new(ResponseCache::new());
        let limiter = Arc::new(ConcurrencyLimiter::new(
            config.max_concurrent_upstream_calls,
        ));
        Self::with_shared(upstream, cache, limiter, config)
    }

    /// Creates a coordinator over an existing cache and limiter
    ///
    /// Several coordinators built this way share one concurrency budget and
    /// one set of cached payloads.
    pub fn with_shared(
        upstream: Arc<U>,
        cache: Arc<ResponseCache>,
        limiter: Arc<ConcurrencyLimiter>,
        config: &FetchConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            cache,
            limiter,
            upstream,
            policy: config.retry_policy(),
            cache_ttl: config.cache_ttl(),
            attempt_timeout: config.attempt_timeout(),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Returns the payload for `key`, from cache or from the upstream
    pub async fn fetch(&self, key: &str) -> Result<Payload, FetchError> {
        self.fetch_detailed(key).await.result
    }

    /// Like `fetch`, but gives up with `FetchError::Cancelled` as soon as
    /// `cancel` completes
    ///
    /// Abandoning the fetch drops it, which returns any held limiter slot.
    pub async fn fetch_cancellable<F>(&self, key: &str, cancel: F) -> Result<Payload, FetchError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            _ = cancel => {
                Counters::bump(&self.counters.cancelled);
                debug!("fetch for {} cancelled by caller", key);
                Err(FetchError::Cancelled)
            }
            result = self.fetch(key) => result,
        }
    }

    /// Fetches every key concurrently, returning results in input order
    pub async fn fetch_many<I>(&self, keys: I) -> Vec<FetchReport>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let keys: Vec<String> = keys
            .into_iter()
            .map(|key| key.as_ref().to_string())
            .collect();
        join_all(keys.iter().map(|key| self.fetch_detailed(key))).await
    }

    /// Returns the payload for `key` together with the attempt history
    pub async fn fetch_detailed(&self, key: &str) -> FetchReport {
        let started = Instant::now();

        if let Some(payload) = self.cache.get(key) {
            Counters::bump(&self.counters.cache_hits);
            debug!("cache hit for {}", key);
            return FetchReport {
                key: key.to_string(),
                result: Ok(payload),
                attempts: Vec::new(),
                from_cache: true,
                elapsed: started.elapsed(),
            };
        }

        Counters::bump(&self.counters.cache_misses);
        debug!("cache miss for {}", key);

        let mut attempts = Vec::new();
        let result = self.fetch_upstream(key, &mut attempts).await;
        match &result {
            Ok(_) => Counters::bump(&self.counters.successes),
            Err(e) => {
                Counters::bump(&self.counters.failures);
                warn!("fetch for {} failed: {}", key, e);
            }
        }

        FetchReport {
            key: key.to_string(),
            result,
            attempts,
            from_cache: false,
            elapsed: started.elapsed(),
        }
    }

    /// Runs the retry sequence for `key` inside one limiter slot
    async fn fetch_upstream(
        &self,
        key: &str,
        attempts: &mut Vec<FetchAttempt>,
    ) -> Result<Payload, FetchError> {
        let slot = self.limiter.acquire().await?;
        let mut attempt_number = 1;

        let result = loop {
            Counters::bump(&self.counters.upstream_attempts);
            let outcome = self.attempt(key).await;

            let failure = match &outcome {
                AttemptOutcome::Success(payload) => {
                    let payload = payload.clone();
                    attempts.push(FetchAttempt {
                        key: key.to_string(),
                        attempt_number,
                        outcome,
                        backoff: None,
                    });
                    break Ok(payload);
                }
                AttemptOutcome::TransientFailure(reason) => Failure::Transient(reason.clone()),
                AttemptOutcome::PermanentFailure(reason) => Failure::Permanent(reason.clone()),
            };
            let reason = failure.reason().to_string();

            match self.policy.decide(attempt_number, failure) {
                RetryDecision::Retry(delay) => {
                    info!(
                        "attempt {} for {} failed ({}), retrying in {:?}",
                        attempt_number, key, reason, delay
                    );
                    attempts.push(FetchAttempt {
                        key: key.to_string(),
                        attempt_number,
                        outcome,
                        backoff: Some(delay),
                    });
                    Counters::bump(&self.counters.retries);
                    tokio::time::sleep(delay).await;
                    attempt_number += 1;
                }
                RetryDecision::GiveUp(reason) => {
                    attempts.push(FetchAttempt {
                        key: key.to_string(),
                        attempt_number,
                        outcome,
                        backoff: None,
                    });
                    break Err(FetchError::from(reason));
                }
            }
        };

        if let Ok(payload) = &result {
            self.cache.put(key, payload.clone(), self.cache_ttl);
        }
        self.limiter.release(slot);
        result
    }

    /// One upstream call bounded by the attempt timeout
    async fn attempt(&self, key: &str) -> AttemptOutcome<Payload> {
        match tokio::time::timeout(self.attempt_timeout, self.upstream.call(key)).await {
            Ok(raw) => raw.into(),
            Err(_) => AttemptOutcome::TransientFailure(format!(
                "attempt timed out after {:?}",
                self.attempt_timeout
            )),
        }
    }

    /// Counters accumulated since construction
    pub fn stats(&self) -> FetchStats {
        self.counters.snapshot()
    }

    /// The shared response cache
    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// The shared concurrency limiter
    pub fn limiter(&self) -> &Arc<ConcurrencyLimiter> {
        &self.limiter
    }
}
