//! Retry policy for network operations

use crate::error::VidlError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Maximum delay between attempts
    pub max_delay: Duration,
    /// Backoff multiplier
    pub backoff_multiplier: f64,
    /// Jitter factor (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }
}

impl RetryConfig {
    /// Delay to sleep after the given failed attempt (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(attempt as i32);
        let millis = (self.initial_delay.as_millis() as f64 * factor) as u64;
        Duration::from_millis(millis).min(self.max_delay)
    }
}

/// Retry executor
#[derive(Debug, Clone, Default)]
pub struct RetryExecutor {
    config: RetryConfig,
}

impl RetryExecutor {
    /// Create a new retry executor with configuration
    pub fn with_config(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Run `func` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent. Each retry is logged before sleeping.
    pub async fn execute<F, Fut, T>(&self, label: &str, mut func: F) -> Result<T, VidlError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, VidlError>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match func().await {
                Ok(result) => return Ok(result),
                Err(error) if error.is_retryable() && attempt + 1 < attempts => {
                    let delay = self.config.delay_for(attempt) + self.jitter(attempt);
                    warn!(
                        "{}: {}, retrying in {:?} (attempt {}/{})",
                        label,
                        error,
                        delay,
                        attempt + 1,
                        attempts
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn jitter(&self, attempt: u32) -> Duration {
        if self.config.jitter_factor <= 0.0 {
            return Duration::ZERO;
        }
        let range = self.config.delay_for(attempt).as_millis() as f64 * self.config.jitter_factor;
        Duration::from_millis((rand::random::<f64>() * range) as u64)
    }
}

/// Retry configuration builder
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: RetryConfig::default(),
        }
    }

    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.config.max_attempts = max_attempts;
        self
    }

    pub fn initial_delay(mut self, initial_delay: Duration) -> Self {
        self.config.initial_delay = initial_delay;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.config.max_delay = max_delay;
        self
    }

    pub fn backoff_multiplier(mut self, backoff_multiplier: f64) -> Self {
        self.config.backoff_multiplier = backoff_multiplier;
        self
    }

    /// Set jitter factor, clamped to 0.0..=1.0
    pub fn jitter_factor(mut self, jitter_factor: f64) -> Self {
        self.config.jitter_factor = jitter_factor.clamp(0.0, 1.0);
        self
    }

    pub fn build(self) -> RetryConfig {
        self.config
    }
}

impl Default for RetryConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    fn fast_executor(max_attempts: u32) -> RetryExecutor {
        RetryExecutor::with_config(
            RetryConfigBuilder::new()
                .max_attempts(max_attempts)
                .initial_delay(Duration::from_millis(1))
                .build(),
        )
    }

    #[test]
    fn test_retry_config_default() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.initial_delay, Duration::from_secs(1));
        assert_eq!(config.backoff_multiplier, 2.0);
        assert_eq!(config.jitter_factor, 0.0);
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let config = RetryConfigBuilder::new()
            .initial_delay(Duration::from_secs(1))
            .max_delay(Duration::from_secs(5))
            .build();
        assert_eq!(config.delay_for(0), Duration::from_secs(1));
        assert_eq!(config.delay_for(1), Duration::from_secs(2));
        assert_eq!(config.delay_for(2), Duration::from_secs(4));
        assert_eq!(config.delay_for(3), Duration::from_secs(5));
    }

    #[test]
    fn test_retry_config_builder_jitter_clamping() {
        let config = RetryConfigBuilder::new().jitter_factor(1.5).build();
        assert_eq!(config.jitter_factor, 1.0);

        let config = RetryConfigBuilder::new().jitter_factor(-0.5).build();
        assert_eq!(config.jitter_factor, 0.0);
    }

    #[tokio::test]
    async fn test_retry_executor_recovers() {
        let executor = fast_executor(3);
        let counter = Arc::new(AtomicU32::new(0));

        let result = executor
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(VidlError::Transient("boom".to_string()))
                    } else {
                        Ok("Success")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retry_executor_stops_after_max_attempts() {
        let executor = fast_executor(3);
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), VidlError> = executor
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(VidlError::Transient("boom".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(VidlError::Transient(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_executor_non_retryable_error() {
        let executor = fast_executor(3);
        let counter = Arc::new(AtomicU32::new(0));

        let result: Result<(), VidlError> = executor
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(VidlError::NotFound("gone".to_string()))
                }
            })
            .await;

        assert!(matches!(result, Err(VidlError::NotFound(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let executor = fast_executor(0);
        let counter = Arc::new(AtomicU32::new(0));

        let _ = executor
            .execute("test", || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(VidlError::Transient("boom".to_string()))
                }
            })
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
