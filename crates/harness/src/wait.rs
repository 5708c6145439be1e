//! Bounded polling

use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::config::WaitConfig;
use crate::error::{HarnessError, HarnessResult};

/// Deadline for one polling loop.
///
/// Uses the tokio clock, so paused-time tests advance through waits
/// without sleeping for real.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    timeout: Duration,
    poll: Duration,
}

impl Deadline {
    pub fn new(config: &WaitConfig) -> Self {
        Self::with_timeout(config.timeout(), config.poll_interval())
    }

    pub fn with_timeout(timeout: Duration, poll: Duration) -> Self {
        Self {
            started: Instant::now(),
            timeout,
            poll,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }

    /// Sleep one poll interval, or fail with a timeout once the deadline
    /// has passed.
    pub async fn tick(&self, what: impl FnOnce() -> String) -> HarnessResult<()> {
        if self.expired() {
            return Err(HarnessError::Timeout {
                what: what(),
                timeout_ms: self.timeout.as_millis() as u64,
            });
        }
        sleep(self.poll).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tick_until_timeout() {
        let deadline = Deadline::with_timeout(Duration::from_millis(300), Duration::from_millis(100));
        let mut ticks = 0;
        let err = loop {
            match deadline.tick(|| "banner".to_string()).await {
                Ok(()) => ticks += 1,
                Err(e) => break e,
            }
        };
        assert_eq!(ticks, 3);
        match err {
            HarnessError::Timeout { what, timeout_ms } => {
                assert_eq!(what, "banner");
                assert_eq!(timeout_ms, 300);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
