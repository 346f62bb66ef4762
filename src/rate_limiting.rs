// ABOUTME: Per-provider token-bucket rate limiting shared across all connections of a provider
// ABOUTME: A burst of syncs for many users of one brand never exceeds that brand's declared budget
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Wearsync Contributors

use crate::errors::{ProviderError, ProviderResult};
use crate::models::DeviceType;
use crate::providers::core::RateLimitBudget;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// One provider's token bucket
struct Bucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(budget: RateLimitBudget) -> Self {
        let capacity = f64::from(budget.requests).max(1.0);
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: capacity / budget.per.as_secs_f64().max(1.0),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self, now: Instant) {
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    /// Take one token, or report how long until one is available
    fn try_take(&mut self, now: Instant) -> Result<(), Duration> {
        self.refill(now);
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - self.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }
}

/// Token buckets per provider, guarded by one lock.
///
/// Budgets are declared by adapters and installed lazily on first use; the
/// bucket is shared by every connection of the provider, so 50 Fitbit users
/// syncing at once collectively stay inside the Fitbit budget.
pub struct ProviderRateLimiter {
    buckets: Mutex<HashMap<DeviceType, Bucket>>,
    /// Longest a caller will wait for a token before failing rate-limited
    max_wait: Duration,
}

impl ProviderRateLimiter {
    /// Limiter that waits at most `max_wait` for a token
    #[must_use]
    pub fn new(max_wait: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            max_wait,
        }
    }

    /// Take one token without waiting, or learn how long until one frees up.
    ///
    /// # Errors
    ///
    /// Returns the wait duration when the bucket is empty.
    pub fn try_acquire(
        &self,
        device_type: DeviceType,
        budget: RateLimitBudget,
    ) -> Result<(), Duration> {
        let mut buckets = match self.buckets.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buckets
            .entry(device_type)
            .or_insert_with(|| Bucket::new(budget))
            .try_take(Instant::now())
    }

    /// Take one token, waiting briefly if the bucket is empty.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::RateLimited`] when no token will free up
    /// within the configured maximum wait.
    pub async fn acquire(
        &self,
        device_type: DeviceType,
        budget: RateLimitBudget,
    ) -> ProviderResult<()> {
        match self.try_acquire(device_type, budget) {
            Ok(()) => Ok(()),
            Err(wait) if wait <= self.max_wait => {
                debug!(provider = %device_type, wait_ms = wait.as_millis() as u64, "rate limit wait");
                tokio::time::sleep(wait).await;
                // One sleeper per deficit token; a second contender repeats the wait
                match self.try_acquire(device_type, budget) {
                    Ok(()) => Ok(()),
                    Err(wait) => Err(ProviderError::RateLimited {
                        provider: device_type.as_str().to_owned(),
                        retry_after_secs: wait.as_secs().max(1),
                    }),
                }
            }
            Err(wait) => Err(ProviderError::RateLimited {
                provider: device_type.as_str().to_owned(),
                retry_after_secs: wait.as_secs().max(1),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_is_bounded_by_declared_budget() {
        let limiter = ProviderRateLimiter::new(Duration::ZERO);
        let budget = RateLimitBudget::per_hour(5);

        for _ in 0..5 {
            assert!(limiter.try_acquire(DeviceType::Fitbit, budget).is_ok());
        }
        assert!(limiter.try_acquire(DeviceType::Fitbit, budget).is_err());
    }

    #[test]
    fn buckets_are_per_provider() {
        let limiter = ProviderRateLimiter::new(Duration::ZERO);
        let budget = RateLimitBudget::per_hour(1);

        assert!(limiter.try_acquire(DeviceType::Fitbit, budget).is_ok());
        assert!(limiter.try_acquire(DeviceType::Fitbit, budget).is_err());
        // Exhausting Fitbit leaves Oura untouched
        assert!(limiter.try_acquire(DeviceType::Oura, budget).is_ok());
    }

    #[tokio::test]
    async fn acquire_fails_rate_limited_beyond_max_wait() {
        let limiter = ProviderRateLimiter::new(Duration::from_millis(1));
        let budget = RateLimitBudget::per_hour(1);

        limiter.try_acquire(DeviceType::Polar, budget).ok();
        let err = limiter.acquire(DeviceType::Polar, budget).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { .. }));
    }
}
