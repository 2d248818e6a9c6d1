//! Periodic restart scheduling for the supervised resolver.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::command::Command;
use crate::metrics::{self, RestartReason};
use crate::settings::{RescheduleReceiver, SettingsStore};

/// Emits `Restart` commands into the supervisor's command stream according
/// to the configured refresh period.
///
/// The deadline is recomputed from scratch on every scheduling decision
/// rather than mutating a reused timer, so a period change arriving while
/// a tick is due can neither lose the tick nor double-fire it: the
/// `select!` below handles one of the two and the next iteration sees a
/// consistent deadline.
pub struct RestartScheduler {
    store: SettingsStore,
    reschedule_rx: RescheduleReceiver,
    commands: mpsc::Sender<Command>,
}

impl RestartScheduler {
    /// Build a scheduler over the store's reschedule channel, pushing
    /// `Restart` into the supervisor's command stream.
    pub fn new(
        store: SettingsStore,
        reschedule_rx: RescheduleReceiver,
        commands: mpsc::Sender<Command>,
    ) -> Self {
        Self {
            store,
            reschedule_rx,
            commands,
        }
    }

    /// Run the scheduler until `cancel` fires or the supervisor goes away.
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut last_tick: Option<Instant> = None;
        let mut deadline = arm(Instant::now(), self.store.get().refresh_period);

        loop {
            // Placeholder deadline is never polled while disarmed.
            let fire_at = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("restart scheduler shutting down");
                    return;
                }

                _ = sleep_until(fire_at), if deadline.is_some() => {
                    last_tick = Some(Instant::now());
                    info!("refresh period elapsed, requesting resolver restart");
                    // Blocks until the supervisor accepts the command,
                    // serializing scheduled restarts behind in-flight ones.
                    // The loop records the restart metric when it acts.
                    if self.commands.send(Command::Restart(RestartReason::Scheduled)).await.is_err() {
                        debug!("supervisor gone, stopping scheduler");
                        return;
                    }
                    deadline = arm(Instant::now(), self.store.get().refresh_period);
                }

                notified = self.reschedule_rx.recv() => {
                    if notified.is_none() {
                        debug!("settings store gone, stopping scheduler");
                        return;
                    }
                    let period = self.store.get().refresh_period;
                    deadline = reschedule(last_tick, period);
                    debug!(period_secs = period.as_secs(), armed = deadline.is_some(), "rescheduled restart timer");
                    metrics::record_scheduler_reschedule(deadline.is_some());
                }
            }
        }
    }
}

fn arm(now: Instant, period: Duration) -> Option<Instant> {
    if period.is_zero() {
        None
    } else {
        Some(now + period)
    }
}

/// Compute the new deadline after a period change. Time already waited
/// since the last tick counts against the new period; a spent or negative
/// remainder fires on the next scheduler iteration.
fn reschedule(last_tick: Option<Instant>, new_period: Duration) -> Option<Instant> {
    if new_period.is_zero() {
        return None;
    }
    let elapsed = last_tick.map(|t| t.elapsed()).unwrap_or(Duration::ZERO);
    let remaining = new_period.saturating_sub(elapsed);
    Some(Instant::now() + remaining)
}
