//! REST probe used to repair poll state after reloads or missed pushes.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    api::{ApiError, StudentBackend},
    dto::{SessionCode, poll::ActivePollPayload},
    session::clock::{self, ClockOffset},
};

/// A recovered activation together with its freshly derived clock anchor.
#[derive(Debug, Clone)]
pub struct RecoveredPoll {
    /// Activation payload as returned by the backend.
    pub payload: ActivePollPayload,
    /// Offset derived from the probe's server timestamp.
    pub offset: ClockOffset,
    /// Whole seconds left at the time of the probe.
    pub remaining: u64,
}

/// Ask the backend whether a poll is running right now.
///
/// Missing polls, polls whose deadline already passed, and transient probe
/// failures all yield `Ok(None)`; the session keeps waiting for push events.
/// Only credential failures surface as errors.
pub async fn probe_active_poll(
    backend: &Arc<dyn StudentBackend>,
    code: &SessionCode,
) -> Result<Option<RecoveredPoll>, ApiError> {
    let payload = match backend.fetch_active_poll(code).await {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            debug!(code = %code, "no active poll in session");
            return Ok(None);
        }
        Err(err @ (ApiError::AuthRequired | ApiError::AccessDenied)) => return Err(err),
        Err(err) => {
            warn!(code = %code, error = %err, "active poll probe failed");
            return Ok(None);
        }
    };

    let offset = ClockOffset::between(payload.server_time, clock::local_now());
    let remaining = clock::remaining_secs(payload.poll_end_time, offset);
    if remaining == 0 {
        debug!(poll_id = %payload.poll.id, "active poll already expired, discarding");
        return Ok(None);
    }

    debug!(poll_id = %payload.poll.id, remaining, "recovered active poll");
    Ok(Some(RecoveredPoll {
        payload,
        offset,
        remaining,
    }))
}
