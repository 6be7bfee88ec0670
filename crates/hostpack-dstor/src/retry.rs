use std::path::Path;
use std::thread;
use std::time::Duration;

use hostpack_core::{PackageId, Result};
use tracing::warn;

use crate::DistributionStorage;

/// Bounded exponential backoff for transient fetch failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_interval: Duration,
    pub max_interval: Duration,
    pub max_total_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            max_total_wait: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before the attempt following failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_interval
            .saturating_mul(1u32 << exponent)
            .min(self.max_interval)
    }

    pub fn run<T, Op, Sleep>(&self, what: &str, mut op: Op, mut sleep: Sleep) -> Result<T>
    where
        Op: FnMut(u32) -> Result<T>,
        Sleep: FnMut(Duration),
    {
        let max_attempts = self.max_attempts.max(1);
        let mut waited = Duration::ZERO;
        let mut attempt = 1;
        loop {
            let err = match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_transient() || attempt >= max_attempts {
                return Err(err);
            }

            let delay = self.delay_after(attempt);
            if waited + delay > self.max_total_wait {
                return Err(err);
            }
            warn!(
                what,
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err.chain_message(),
                "transient failure, retrying"
            );
            sleep(delay);
            waited += delay;
            attempt += 1;
        }
    }
}

pub fn fetch_package_with_retry(
    driver: &dyn DistributionStorage,
    pkg_id: &PackageId,
    destination: &Path,
    policy: &RetryPolicy,
) -> Result<()> {
    policy.run(
        &pkg_id.to_string(),
        |_| driver.fetch_package(pkg_id, destination),
        thread::sleep,
    )
}

pub fn fetch_resource_with_retry(
    driver: &dyn DistributionStorage,
    rel_path: &str,
    destination: &Path,
    policy: &RetryPolicy,
) -> Result<()> {
    policy.run(
        rel_path,
        |_| driver.fetch_resource(rel_path, destination),
        thread::sleep,
    )
}
