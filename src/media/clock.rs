use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use tokio_util::sync::CancellationToken;

/// Granularity at which a sleeping pipeline notices cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Time as the pipeline sees it: wall time names segment files, monotonic time drives
/// rotation and pacing.
pub trait Clock: Send + Sync {
    fn wall(&self) -> DateTime<Local>;

    fn monotonic(&self) -> Instant;

    /// Blocks for `duration`. Returns `false` if `cancel` fired before the time elapsed.
    fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }

    fn monotonic(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if cancel.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// The instant a frame was handed to a sink.
#[derive(Debug, Clone, Copy)]
pub struct FrameTime {
    pub wall: DateTime<Local>,
    pub monotonic: Instant,
}

impl FrameTime {
    pub fn now(clock: &dyn Clock) -> Self {
        Self {
            wall: clock.wall(),
            monotonic: clock.monotonic(),
        }
    }
}

#[cfg(test)]
pub use manual::ManualClock;
