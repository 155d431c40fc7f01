//! Concurrency limiter for upstream calls
//!
//! Bounds the number of simultaneous in-flight upstream calls. Waiters are
//! queued in FIFO order by the underlying tokio semaphore, so no waiter is
//! skipped while capacity exists. A slot is an owned guard: dropping it or
//! passing it to `release` returns capacity exactly once.

use log::trace;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Errors reported by the limiter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimiterError {
    /// The limiter was closed and hands out no more slots
    #[error("concurrency limiter is closed")]
    Closed,
}

/// Bounds simultaneous upstream calls to a fixed capacity
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot; capacity returns when this is released or dropped
#[derive(Debug)]
#[must_use = "dropping a slot releases it immediately"]
pub struct LimiterSlot {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// Creates a limiter with `capacity` slots (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Waits until a slot is free and takes it
    ///
    /// Cancel-safe: if the returned future is dropped while waiting, no slot
    /// is consumed.
    pub async fn acquire(&self) -> Result<LimiterSlot, LimiterError> {
        if self.semaphore.available_permits() == 0 {
            trace!("all {} limiter slots busy, waiting", self.capacity);
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LimiterError::Closed)?;
        Ok(LimiterSlot { _permit: permit })
    }

    /// Takes a slot only if one is free right now
    pub fn try_acquire(&self) -> Option<LimiterSlot> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| LimiterSlot { _permit: permit })
    }

    /// Returns a slot to the pool, waking at most one waiter
    pub fn release(&self, slot: LimiterSlot) {
        drop(slot);
    }

    /// Number of slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Number of slots fixed at construction
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots currently held
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }

    /// Stops handing out slots; pending and future `acquire` calls fail
    pub fn close(&self) {
        self.semaphore.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_acquire_and_release_restore_capacity() {
        let limiter = ConcurrencyLimiter::new(2);
        assert_eq!(limiter.capacity(), 2);
        assert_eq!(limiter.available(), 2);

        let a = limiter.acquire().await.expect("slot");
        let b = limiter.acquire().await.expect("slot");
        assert_eq!(limiter.available(), 0);
        assert_eq!(limiter.in_use(), 2);
        assert!(limiter.try_acquire().is_none());

        limiter.release(a);
        assert_eq!(limiter.available(), 1);
        drop(b);
        assert_eq!(limiter.available(), 2);
    }

    #[test]
    fn test_zero_capacity_is_clamped_to_one() {
        let limiter = ConcurrencyLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
    }

    #[tokio::test]
    async fn test_waiter_is_woken_by_release() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1));
        let held = limiter.acquire().await.expect("slot");

        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.map(|_slot| ()) })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished(), "waiter should block while slot is held");

        limiter.release(held);
        waiter
            .await
            .expect("task panicked")
            .expect("waiter should get the slot");
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_waiters_are_served_in_fifo_order() {
        let limiter = Arc::new(ConcurrencyLimiter::new(1));
        let held = limiter.acquire().await.expect("slot");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let mut handles = Vec::new();
        for id in 0..4 {
            let limiter = limiter.clone();
            let tx = tx.clone();
            handles.push(tokio::spawn(async move {
                let slot = limiter.acquire().await.expect("slot");
                tx.send(id).expect("receiver alive");
                drop(slot);
            }));
            // Let each waiter enqueue before spawning the next
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        limiter.release(held);
        for handle in handles {
            handle.await.expect("task panicked");
        }
        drop(tx);

        let mut order = Vec::new();
        while let Some(id) = rx.recv().await {
            order.push(id);
        }
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_abandoned_wait_does_not_leak() {
        let limiter = ConcurrencyLimiter::new(1);
        let held = limiter.acquire().await.expect("slot");

        let timed_out = tokio::time::timeout(Duration::from_millis(10), limiter.acquire()).await;
        assert!(timed_out.is_err());

        drop(held);
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_closed_limiter_rejects_acquire() {
        let limiter = ConcurrencyLimiter::new(3);
        limiter.close();
        assert_eq!(limiter.acquire().await.unwrap_err(), LimiterError::Closed);
    }
}
