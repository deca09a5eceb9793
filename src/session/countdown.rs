//! Countdown scheduling for the active poll.

use std::time::Duration;

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    dto::EpochMillis,
    session::clock::{self, ClockOffset},
};

/// Period between remaining-time recomputations while a poll is live.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Signals produced by the countdown task.
///
/// Every signal names the poll it was timed for. Cancelling the task does
/// not recall signals it already queued, so receivers match the id against
/// the poll they are tracking before acting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownSignal {
    /// Periodic recomputation of the remaining whole seconds.
    Tick {
        /// Poll this countdown was started for.
        poll_id: Uuid,
        /// Whole seconds left before the deadline.
        remaining: u64,
    },
    /// The deadline was reached. Emitted once; the task stops afterwards.
    Expired {
        /// Poll this countdown was started for.
        poll_id: Uuid,
    },
}

/// Handle to a running countdown task.
///
/// The task recomputes the remaining time from the absolute deadline on every
/// tick, so a late or missed tick cannot stretch the countdown. Dropping the
/// handle aborts the task; no further signals are delivered.
#[derive(Debug)]
pub struct Countdown {
    task: JoinHandle<()>,
}

impl Countdown {
    /// Spawn a countdown for `poll_id` toward `deadline`, pushing signals
    /// into `ticks`.
    pub fn start<T>(
        poll_id: Uuid,
        deadline: EpochMillis,
        offset: ClockOffset,
        ticks: mpsc::UnboundedSender<T>,
    ) -> Self
    where
        T: From<CountdownSignal> + Send + 'static,
    {
        Self::start_with_period(poll_id, deadline, offset, ticks, DEFAULT_TICK_PERIOD)
    }

    /// Same as [`Countdown::start`] with a custom period, shortened in tests.
    pub fn start_with_period<T>(
        poll_id: Uuid,
        deadline: EpochMillis,
        offset: ClockOffset,
        ticks: mpsc::UnboundedSender<T>,
        period: Duration,
    ) -> Self
    where
        T: From<CountdownSignal> + Send + 'static,
    {
        let task = tokio::spawn(async move {
            // The activation handler already published the initial remaining
            // time, so the first recomputation comes one period later.
            let mut ticker = time::interval_at(time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let remaining = clock::remaining_secs(deadline, offset);
                if remaining == 0 {
                    let _ = ticks.send(CountdownSignal::Expired { poll_id }.into());
                    break;
                }
                let tick = CountdownSignal::Tick { poll_id, remaining };
                if ticks.send(tick.into()).is_err() {
                    break;
                }
            }
        });

        Self { task }
    }

    /// Stop the task without waiting for the deadline.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for Countdown {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn expired_fires_once_and_ends_the_task() {
        let (tx, mut rx) = mpsc::unbounded_channel::<CountdownSignal>();
        let poll_id = Uuid::new_v4();
        let deadline = clock::local_now();
        let _countdown = Countdown::start_with_period(
            poll_id,
            deadline,
            ClockOffset::default(),
            tx,
            Duration::from_millis(10),
        );

        assert_eq!(rx.recv().await, Some(CountdownSignal::Expired { poll_id }));
        // The task dropped its sender after expiry.
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn ticks_count_down_to_expiry() {
        let (tx, mut rx) = mpsc::unbounded_channel::<CountdownSignal>();
        let poll_id = Uuid::new_v4();
        let deadline = clock::local_now() + 1_100;
        let _countdown = Countdown::start_with_period(
            poll_id,
            deadline,
            ClockOffset::default(),
            tx,
            Duration::from_millis(50),
        );

        let mut signals = Vec::new();
        while let Some(signal) = rx.recv().await {
            signals.push(signal);
        }

        assert_eq!(signals.last(), Some(&CountdownSignal::Expired { poll_id }));
        let expiries = signals
            .iter()
            .filter(|signal| matches!(signal, CountdownSignal::Expired { .. }))
            .count();
        assert_eq!(expiries, 1);
        assert!(signals.contains(&CountdownSignal::Tick { poll_id, remaining: 1 }));
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_ticks() {
        let (tx, mut rx) = mpsc::unbounded_channel::<CountdownSignal>();
        let deadline = clock::local_now() + 60_000;
        let countdown = Countdown::start_with_period(
            Uuid::new_v4(),
            deadline,
            ClockOffset::default(),
            tx,
            Duration::from_millis(10),
        );

        rx.recv().await.expect("at least one tick");
        drop(countdown);

        // Draining after the abort terminates: the sender is gone.
        while rx.recv().await.is_some() {}
    }
}
