//! Time sources for the idle timers.
//!
//! Timers only ever see offsets from an arbitrary origin. [`TokioClock`]
//! follows the runtime's clock, so paused test time drives it too.

use std::{fmt::Debug, time::Duration};

/// Monotonic time source.
pub trait Clock: Send + Sync + Debug {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Clock backed by the tokio runtime, so paused test time applies to it.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: tokio::time::Instant,
}

impl TokioClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: tokio::time::Instant::now(),
        }
    }

    /// Runtime instant corresponding to an offset from this clock's origin.
    #[must_use]
    pub fn instant_at(&self, offset: Duration) -> tokio::time::Instant {
        self.origin + offset
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_tokio_clock_follows_paused_time() {
        let clock = TokioClock::new();
        tokio::time::advance(Duration::from_secs(90)).await;
        assert_eq!(clock.now(), Duration::from_secs(90));
        assert_eq!(
            clock.instant_at(Duration::from_secs(90)),
            tokio::time::Instant::now()
        );
    }
}
