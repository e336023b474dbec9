//! Minimum-interval gate for attendance triggers

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Drops shutter requests that arrive within `interval` of the last capture
#[derive(Debug, Clone)]
pub struct ThrottleGate {
    interval: Duration,
    last_capture_at: Option<Instant>,
}

impl ThrottleGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_capture_at: None,
        }
    }

    /// `Ok` when a capture may fire at `now`, otherwise the time left
    pub fn check(&self, now: Instant) -> Result<(), Duration> {
        match self.last_capture_at {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                if elapsed < self.interval {
                    let remaining = self.interval - elapsed;
                    debug!("Throttle gate closed for another {:?}", remaining);
                    Err(remaining)
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    /// Remember a capture fired at `now`
    pub fn record(&mut self, now: Instant) {
        self.last_capture_at = Some(now);
    }

    /// Time of the last recorded capture
    pub fn last_capture_at(&self) -> Option<Instant> {
        self.last_capture_at
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
