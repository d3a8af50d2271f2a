//! Pacing for a capture device whose reads keep failing.

use std::time::Duration;

const FIRST_DELAY: Duration = Duration::from_millis(10);
const MAX_DELAY: Duration = Duration::from_millis(500);

/// Consecutive failures before the device is reported as stalled
pub const STALL_THRESHOLD: u32 = 30;

/// Doubles the wait after each consecutive failed read, up to half a second.
#[derive(Debug, Default)]
pub struct ReadBackoff {
    failures: u32,
}

impl ReadBackoff {
    /// Record a failed read and return how long to wait before the next one.
    pub fn failed(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        let doublings = (self.failures - 1).min(6);
        (FIRST_DELAY * 2u32.pow(doublings)).min(MAX_DELAY)
    }

    /// A read succeeded. Returns the length of the streak it ended.
    pub fn succeeded(&mut self) -> u32 {
        std::mem::take(&mut self.failures)
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// True once per streak, on the failure that reaches [`STALL_THRESHOLD`]
    pub fn just_stalled(&self) -> bool {
        self.failures == STALL_THRESHOLD
    }
}
