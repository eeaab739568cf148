//! Token-bucket pacing for request execution

use std::num::NonZeroU32;

use governor::{clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter};
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Token-bucket rate limiter shared by all workers of a run.
///
/// Burst size is 1, so requests are spaced evenly rather than released in
/// clumps. A rate of zero disables pacing entirely.
pub struct RequestRateLimiter {
    limiter: Option<RateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    rate: f64,
}

impl RequestRateLimiter {
    /// Create a limiter for `rate` requests per second; zero or negative
    /// disables rate limiting.
    ///
    /// Fractional rates are rounded up to the next whole request per second.
    pub fn new(rate: f64) -> Self {
        let limiter = if rate > 0.0 {
            NonZeroU32::new((rate.ceil() as u32).max(1))
                .map(|rps| RateLimiter::direct(Quota::per_second(rps).allow_burst(NonZeroU32::MIN)))
        } else {
            None
        };
        Self { limiter, rate }
    }

    /// Block until the next request is allowed, or until `cancel` fires.
    ///
    /// Unlimited mode never suspends and never errors: a worker that already
    /// holds a request executes it, and drains out through the closed channel
    /// instead.
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<()> {
        match &self.limiter {
            Some(limiter) => {
                tokio::select! {
                    // An already-available token wins over cancellation.
                    biased;
                    _ = limiter.until_ready() => Ok(()),
                    _ = cancel.cancelled() => Err(Error::Cancelled),
                }
            }
            None => Ok(()),
        }
    }

    /// Whether pacing is active.
    pub fn is_enabled(&self) -> bool {
        self.limiter.is_some()
    }

    /// The configured rate in requests per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }
}

impl std::fmt::Debug for RequestRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestRateLimiter")
            .field("rate", &self.rate)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}
