/*!
 * Utility functions and helpers for bluedex.
 *
 * The discovery procedure suspends for a caller-chosen duration; this module
 * provides the interruptible wait it uses.
 */
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tracing::debug;

/// How a timed wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// The full duration elapsed
    Elapsed,
    /// The wait was cut short by an interrupt after the given time
    Interrupted(Duration),
}

impl WaitOutcome {
    /// Whether the wait was cut short
    pub fn is_interrupted(&self) -> bool {
        matches!(self, WaitOutcome::Interrupted(_))
    }
}

/// Wait for `duration`, returning early if `interrupt` is notified.
///
/// An interrupt is not an error; the caller carries on with whatever happened
/// during the shortened wait. A zero duration returns immediately without
/// polling the interrupt.
pub async fn interruptible_wait(duration: Duration, interrupt: &Notify) -> WaitOutcome {
    if duration.is_zero() {
        return WaitOutcome::Elapsed;
    }

    let started = Instant::now();
    tokio::select! {
        _ = tokio::time::sleep(duration) => WaitOutcome::Elapsed,
        _ = interrupt.notified() => {
            let waited = started.elapsed();
            debug!("Wait of {:?} interrupted after {:?}", duration, waited);
            WaitOutcome::Interrupted(waited)
        }
    }
}

/// Convert milliseconds to a Duration
pub fn millis_to_duration(millis: u64) -> Duration {
    Duration::from_millis(millis)
}
