//! Token bucket guarding calls to a provider with a hard per-second quota.
//!
//! The bucket starts full, so up to `rate` calls may burst immediately. A
//! single background task adds one token every `1s / rate`; a refill that
//! finds the bucket full is dropped, so the bucket never holds more than its
//! capacity.
//!
//! Tokens live in a [`Semaphore`]: consuming one is `acquire` + `forget`,
//! refilling is `add_permits(1)`. The refill task is the only producer, so
//! its "below capacity?" check cannot be invalidated by a concurrent add.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{GatewayError, Result};

/// Rate used when the configured value is not positive.
pub const DEFAULT_REQUESTS_PER_SECOND: usize = 10;

pub struct RateLimiter {
    tokens: Arc<Semaphore>,
    capacity: usize,
    refill_every: Duration,
    shutdown: CancellationToken,
    refill_task: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Create a full bucket of `requests_per_second` tokens and start refilling it.
    /// Rates above [`Semaphore::MAX_PERMITS`] are clamped to it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(requests_per_second: i64) -> Self {
        let capacity = usize::try_from(requests_per_second)
            .ok()
            .filter(|rate| *rate > 0)
            .unwrap_or(DEFAULT_REQUESTS_PER_SECOND)
            .min(Semaphore::MAX_PERMITS);
        let refill_every = (Duration::from_secs(1) / u32::try_from(capacity).unwrap_or(u32::MAX))
            .max(Duration::from_nanos(1));

        let tokens = Arc::new(Semaphore::new(capacity));
        let shutdown = CancellationToken::new();

        let refill_task = tokio::spawn(refill_loop(
            Arc::clone(&tokens),
            capacity,
            refill_every,
            shutdown.clone(),
        ));

        Self {
            tokens,
            capacity,
            refill_every,
            shutdown,
            refill_task: Mutex::new(Some(refill_task)),
        }
    }

    /// Wait for a token until one is available or `cancel` fires.
    ///
    /// A cancelled wait consumes nothing.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(GatewayError::RateLimiterTimeout(
                "cancelled while waiting for a token".to_string(),
            )),
            permit = self.tokens.acquire() => match permit {
                Ok(permit) => {
                    permit.forget();
                    Ok(())
                }
                Err(_) => Err(GatewayError::RateLimiterTimeout(
                    "rate limiter closed".to_string(),
                )),
            },
        }
    }

    /// Wait for a token for at most `timeout`.
    pub async fn acquire_timeout(&self, timeout: Duration) -> Result<()> {
        let never = CancellationToken::new();
        match tokio::time::timeout(timeout, self.acquire(&never)).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::RateLimiterTimeout(format!(
                "no token available within {}ms",
                timeout.as_millis()
            ))),
        }
    }

    /// Take a token if one is available right now.
    pub fn try_acquire(&self) -> bool {
        match self.tokens.try_acquire() {
            Ok(permit) => {
                permit.forget();
                true
            }
            Err(_) => false,
        }
    }

    /// Tokens currently in the bucket.
    pub fn available(&self) -> usize {
        self.tokens.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn refill_interval(&self) -> Duration {
        self.refill_every
    }

    /// Stop the refill task and wait for it to exit. Later calls are no-ops.
    pub async fn stop(&self) {
        let handle = self.refill_task.lock().await.take();
        if let Some(handle) = handle {
            self.shutdown.cancel();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    tracing::error!("Rate limiter refill task failed: {}", e);
                }
            }
            debug!("Rate limiter stopped");
        }
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn refill_loop(
    tokens: Arc<Semaphore>,
    capacity: usize,
    every: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + every, every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                if tokens.available_permits() < capacity {
                    tokens.add_permits(1);
                }
            }
        }
    }
}
