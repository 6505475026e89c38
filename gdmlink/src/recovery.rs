use std::time::Duration;

use tokio::time;

use crate::discovery::Discover;
use crate::transport::Transport;

/// Consecutive timeouts tolerated before the transport is replaced.
pub const FAILURE_LIMIT: u32 = 5;

pub struct Recovery {
    failures: u32,
    limit: u32,
    backoff: Duration,
}

impl Recovery {
    pub fn new(backoff: Duration) -> Self {
        Recovery {
            failures: 0,
            limit: FAILURE_LIMIT,
            backoff,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_failure(&mut self) {
        self.failures += 1;
        log::debug!("{} consecutive failures", self.failures);
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    pub fn should_reacquire(&self) -> bool {
        self.failures > self.limit
    }

    /// Close `current` and look for the meter again. If nothing is found, `current` stays empty
    /// and the call returns after the backoff.
    pub async fn reacquire(
        &mut self,
        current: &mut Option<Box<dyn Transport>>,
        discover: &mut dyn Discover,
    ) -> crate::Result<()> {
        if let Some(mut transport) = current.take() {
            log::warn!("Giving up on {} after {} failures", transport.path(), self.failures);
            transport.close();
        }
        self.failures = 0;
        match discover.discover().await {
            Ok(transport) => {
                *current = Some(transport);
                Ok(())
            }
            Err(err) => {
                log::error!("Meter not found: {}", err);
                time::sleep(self.backoff).await;
                Err(err)
            }
        }
    }
}
