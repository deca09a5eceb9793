//! Clock synchronization between the student client and the backend.
//!
//! Every activation payload carries the server clock at send time. Pairing it
//! with the local receipt time yields an offset that absorbs both clock skew
//! and delivery latency; all countdown math then runs on the server timeline.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::dto::EpochMillis;

/// Signed offset such that `server time ≈ local time + offset`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockOffset(i64);

impl ClockOffset {
    /// Derive the offset from a server timestamp paired with the local time
    /// at which it was received.
    pub fn between(server_time: EpochMillis, local_receipt: EpochMillis) -> Self {
        Self(server_time - local_receipt)
    }

    /// The raw offset in milliseconds.
    pub fn millis(self) -> i64 {
        self.0
    }

    /// Current moment on the server clock, estimated from the local clock.
    pub fn server_now(self) -> EpochMillis {
        local_now() + self.0
    }
}

/// Milliseconds since the Unix epoch on the local clock.
pub fn local_now() -> EpochMillis {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as i64)
}

/// Whole seconds left until `deadline` on the server clock, clamped at zero.
pub fn remaining_secs(deadline: EpochMillis, offset: ClockOffset) -> u64 {
    remaining_secs_at(deadline, offset.server_now())
}

/// Remaining-time computation against an explicit "now", shared by the
/// countdown task and tests.
pub(crate) fn remaining_secs_at(deadline: EpochMillis, server_now: EpochMillis) -> u64 {
    ((deadline - server_now).max(0) / 1000) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_absorbs_clock_skew() {
        // Local clock 200ms ahead of the server.
        let offset = ClockOffset::between(1_000_000, 1_000_200);
        assert_eq!(offset.millis(), -200);

        // Sixty seconds after activation on the server clock.
        let deadline = 1_000_000 + 60_000;
        assert_eq!(remaining_secs_at(deadline, 1_000_200 + offset.millis()), 60);

        // A wildly different local clock produces the same countdown.
        let offset = ClockOffset::between(1_000_000, 5_555_000);
        assert_eq!(remaining_secs_at(deadline, 5_555_000 + offset.millis()), 60);
    }

    #[test]
    fn remaining_is_floored_to_whole_seconds() {
        assert_eq!(remaining_secs_at(10_999, 10_000), 0);
        assert_eq!(remaining_secs_at(11_000, 10_000), 1);
        assert_eq!(remaining_secs_at(11_999, 10_000), 1);
    }

    #[test]
    fn remaining_clamps_past_deadlines_to_zero() {
        assert_eq!(remaining_secs_at(10_000, 10_000), 0);
        assert_eq!(remaining_secs_at(10_000, 99_000), 0);
    }
}
