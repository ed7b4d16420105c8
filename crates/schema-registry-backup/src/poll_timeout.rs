//! Poll timeout for backup consumers

use std::time::Duration;

/// Maximum time to wait for records before declaring the consumer stale
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTimeout(Duration);

impl PollTimeout {
    pub fn new(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl Default for PollTimeout {
    /// One minute, generous enough for a loaded broker
    fn default() -> Self {
        Self(Duration::from_secs(60))
    }
}

impl From<Duration> for PollTimeout {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl std::fmt::Display for PollTimeout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.0)
    }
}
