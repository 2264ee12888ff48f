//! Linear backoff schedule shared by the retrying sender and the coordinator's probe loop.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Attempt 0 is immediate; attempt `n` waits `n * base_delay` first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backoff {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay unit (milliseconds)
    pub base_delay_ms: u64,
}

impl Backoff {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }

    /// Total attempts including the first.
    pub fn attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before `attempt` (0-based).
    pub fn delay_before(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }

    /// Sum of every delay when all attempts are used.
    pub fn worst_case_wait(&self) -> Duration {
        (0..self.attempts()).map(|a| self.delay_before(a)).sum()
    }

    /// Sleep for the delay preceding `attempt`; attempt 0 does not suspend.
    pub async fn wait(&self, attempt: u32) {
        let delay = self.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(2, 500)
    }
}
