//! Clock abstractions used for the absolute timestamps in rate-limit headers.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Clock abstraction so header timestamps can be faked in tests.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current wall-clock time as a duration since the Unix epoch.
    fn now_unix(&self) -> Duration;
}

/// Wall clock backed by `SystemTime::now()`.
///
/// Notes: clamps to zero if the system clock reports a pre-epoch time, so
/// header values stay well-formed even on badly skewed hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> Duration {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
    }
}
