use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::config::ScrapeTarget;
use crate::error::FetchError;
use crate::process::StopSignal;
use crate::request::{PageFetcher, PageToken, RawPage};

/// Waits between requests. Swapped for a no-op in tests.
#[async_trait]
pub trait Pause: Send + Sync {
    async fn pause(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioPause;

#[async_trait]
impl Pause for TokioPause {
    async fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            tokio::time::sleep(duration).await;
        }
    }
}

#[async_trait]
impl<P: Pause + ?Sized> Pause for Arc<P> {
    async fn pause(&self, duration: Duration) {
        (**self).pause(duration).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            multiplier: 2.0,
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following failed attempt number `attempt` (1-based).
    /// A server supplied `Retry-After` is honored up to `max_backoff`.
    pub fn backoff(&self, attempt: u32, error: &FetchError) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        // NaN or negative factors fall back to no wait instead of panicking.
        let mut wait = Duration::try_from_secs_f64(secs.min(self.max_backoff.as_secs_f64()))
            .unwrap_or(Duration::ZERO);

        if let FetchError::RateLimited {
            retry_after: Some(retry_after),
            ..
        } = error
        {
            wait = wait.max(*retry_after).min(self.max_backoff);
        }
        wait
    }
}

/// Wraps a fetcher with a bounded retry loop for rate limiting and network failures.
/// Any other failure, and the last failure once attempts run out, is passed through.
/// A raised stop signal ends the loop early with the last failure.
pub struct Retrying<F, P> {
    inner: F,
    pause: P,
    policy: RetryPolicy,
    stop: StopSignal,
}

impl<F: PageFetcher, P: Pause> Retrying<F, P> {
    pub fn new(inner: F, pause: P, policy: RetryPolicy) -> Self {
        Self {
            inner,
            pause,
            policy,
            stop: StopSignal::never(),
        }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    async fn retry<T, Op, Fut>(&self, what: &str, op: Op) -> Result<T, FetchError>
    where
        Op: Fn() -> Fut + Send,
        Fut: Future<Output = Result<T, FetchError>> + Send,
        T: Send,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.policy.max_attempts => {
                    if self.stop.is_stopped() {
                        return Err(e);
                    }
                    let wait = self.policy.backoff(attempt, &e);
                    warn!(
                        attempt,
                        max_attempts = self.policy.max_attempts,
                        wait_secs = wait.as_secs_f64(),
                        error = %e,
                        "{what} request failed, retrying"
                    );
                    let mut stop = self.stop.clone();
                    tokio::select! {
                        _ = self.pause.pause(wait) => {}
                        _ = stop.stopped() => {}
                    }
                    if self.stop.is_stopped() {
                        return Err(e);
                    }
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[async_trait]
impl<F: PageFetcher, P: Pause> PageFetcher for Retrying<F, P> {
    async fn fetch(
        &self,
        target: &ScrapeTarget,
        token: Option<PageToken>,
    ) -> Result<RawPage, FetchError> {
        self.retry("Listing", move || self.inner.fetch(target, token))
            .await
    }

    async fn fetch_detail(
        &self,
        target: &ScrapeTarget,
        external_path: &str,
    ) -> Result<String, FetchError> {
        self.retry("Detail", move || self.inner.fetch_detail(target, external_path))
            .await
    }
}
