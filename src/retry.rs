use std::time::Duration;
use tracing::info;

use crate::config::RetryConfig;

/// Backoff schedule shared by the upload transport and the command-line fallback
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    multiplier: f64,
    max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier: multiplier.max(1.0),
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_secs(config.retry_delay_seconds),
            config.backoff_multiplier,
            Duration::from_secs(config.max_retry_delay_seconds),
        )
    }

    /// Same attempt budget, constant delay between attempts
    pub fn fixed(&self) -> Self {
        Self {
            multiplier: 1.0,
            max_delay: self.base_delay,
            ..self.clone()
        }
    }

    /// Policy that retries immediately, for tests and dry runs
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, 1.0, Duration::ZERO)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay after the zero-based failed `attempt`: `base * multiplier^attempt`, capped
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(32) as i32;
        let seconds = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = seconds.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// True while another attempt fits in the budget after `attempt` failed
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }

    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay(attempt);
        if !delay.is_zero() {
            info!("⏳ Sleeping {:.1}s before retrying...", delay.as_secs_f64());
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
