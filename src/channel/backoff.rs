//! Reconnect delay schedule for the push channel.

use std::time::Duration;

use rand::Rng;

/// Delay before the first reconnect attempt.
const INITIAL_DELAY: Duration = Duration::from_secs(1);
/// Upper bound on the jitter added to every delay.
const JITTER_MS: u64 = 250;

/// Delay before reconnect attempt `attempt` (zero-based).
///
/// Doubles from [`INITIAL_DELAY`] up to `max`, with up to [`JITTER_MS`] of
/// jitter so a classroom of clients does not hammer the backend in lockstep.
pub(crate) fn reconnect_delay(attempt: u32, max: Duration) -> Duration {
    let base = INITIAL_DELAY
        .checked_mul(2u32.saturating_pow(attempt))
        .map_or(max, |delay| delay.min(max));
    let jitter = Duration::from_millis(rand::rng().random_range(0..=JITTER_MS));
    base + jitter
}
