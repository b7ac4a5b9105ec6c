// SPDX-License-Identifier: MIT OR Apache-2.0
//! Time abstraction for the reconnect backoff sleep, so tests can exercise
//! exact backoff schedules without waiting on wall-clock sleeps.

use std::time::Duration;

use async_trait::async_trait;

/// A source of sleeps. [`RealClock`] sleeps for real; tests supply a fake
/// that resolves immediately (or on an explicit trigger) while still
/// recording what was asked for.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Suspend the calling task for `duration`.
    async fn sleep(&self, duration: Duration);
}

/// Sleeps using the Tokio timer wheel.
#[derive(Debug, Default, Clone, Copy)]
pub struct RealClock;

#[async_trait]
impl Clock for RealClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
pub(crate) mod tests_support {
    use super::{Clock, Duration};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records requested sleep durations and returns without waiting,
    /// letting reconnect/backoff tests assert on the exact schedule.
    #[derive(Default)]
    pub struct InstantClock {
        pub requested: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Clock for InstantClock {
        async fn sleep(&self, duration: Duration) {
            self.requested.lock().unwrap().push(duration);
        }
    }
}
