//! Attempt counting for the client send loop.
//!
//! # Design
//! The caller drives the loop: `next` decides whether another attempt may
//! run (sleeping between attempts), and `validate_code` lets the accept
//! predicate end the loop early. Retries react to status codes only;
//! transport errors never reach the policy.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::config::RetryConfig;

/// Predicate over the last observed status code. `true` stops retrying.
pub type AcceptCode = Arc<dyn Fn(u16) -> bool + Send + Sync>;

#[derive(Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    interval: Duration,
    attempts: u32,
    accept: AcceptCode,
}

impl RetryPolicy {
    /// Up to `max_attempts` attempts, `interval` apart, stopping as soon as
    /// `accept` approves a status code.
    pub fn simple<F>(max_attempts: u32, interval: Duration, accept: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        Self {
            max_attempts,
            interval,
            attempts: 0,
            accept: Arc::new(accept),
        }
    }

    pub fn from_config<F>(config: &RetryConfig, accept: F) -> Self
    where
        F: Fn(u16) -> bool + Send + Sync + 'static,
    {
        Self::simple(config.max_attempts, config.interval(), accept)
    }

    /// Retry until a status the response resolver treats as success.
    pub fn until_success(max_attempts: u32, interval: Duration) -> Self {
        Self::simple(max_attempts, interval, |code| {
            crate::response::SUCCESS_CODES.contains(&code)
        })
    }

    /// The same configuration with the attempt counter reset.
    pub fn fresh(&self) -> Self {
        Self {
            attempts: 0,
            ..self.clone()
        }
    }

    /// Whether another attempt may run.
    ///
    /// Sleeps for the configured interval before every attempt except the
    /// first. The sleep is a plain timer; callers race it against their own
    /// cancellation.
    pub async fn next(&mut self) -> bool {
        if self.attempts >= self.max_attempts {
            return false;
        }
        if self.attempts > 0 && !self.interval.is_zero() {
            debug!(attempt = self.attempts + 1, interval = ?self.interval, "waiting before retry");
            tokio::time::sleep(self.interval).await;
        }
        self.attempts += 1;
        true
    }

    /// Feed the last status code to the accept predicate. Acceptance ends
    /// the loop regardless of the remaining budget.
    pub fn validate_code(&mut self, code: u16) {
        if (self.accept)(code) {
            self.attempts = self.max_attempts;
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts)
    }
}

/// One attempt, any status accepted.
impl Default for RetryPolicy {
    fn default() -> Self {
        Self::simple(1, Duration::ZERO, |_| true)
    }
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("interval", &self.interval)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exhausts_budget_when_never_accepted() {
        let mut retry = RetryPolicy::simple(2, Duration::ZERO, |_| false);
        let mut counter = 0;
        while retry.next().await {
            counter += 1;
            retry.validate_code(400);
        }
        assert_eq!(counter, 2);
        assert_eq!(retry.attempts(), 2);
        assert!(!retry.next().await);
    }

    #[tokio::test]
    async fn accepted_code_stops_after_one_attempt() {
        let mut retry = RetryPolicy::simple(5, Duration::from_secs(60), |_| true);
        let mut counter = 0;
        while retry.next().await {
            counter += 1;
            retry.validate_code(503);
        }
        assert_eq!(counter, 1);
        assert_eq!(retry.remaining(), 0);
    }

    #[tokio::test]
    async fn default_is_one_shot() {
        let mut retry = RetryPolicy::default();
        assert!(retry.next().await);
        assert!(!retry.next().await);
    }

    #[tokio::test]
    async fn zero_budget_never_runs() {
        let mut retry = RetryPolicy::simple(0, Duration::ZERO, |_| true);
        assert!(!retry.next().await);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_skipped_on_first_attempt() {
        let mut retry = RetryPolicy::simple(3, Duration::from_secs(10), |code| code == 200);
        let start = tokio::time::Instant::now();
        assert!(retry.next().await);
        assert_eq!(start.elapsed(), Duration::ZERO);
        retry.validate_code(503);
        assert!(retry.next().await);
        assert!(start.elapsed() >= Duration::from_secs(10));
        retry.validate_code(200);
        assert!(!retry.next().await);
        assert_eq!(retry.attempts(), 3);
    }

    #[tokio::test]
    async fn fresh_resets_the_counter() {
        let mut retry = RetryPolicy::until_success(2, Duration::ZERO);
        while retry.next().await {
            retry.validate_code(500);
        }
        let mut again = retry.fresh();
        assert_eq!(again.attempts(), 0);
        assert!(again.next().await);
        again.validate_code(201);
        assert!(!again.next().await);
    }
}
