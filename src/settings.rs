//! Shared settings store for the supervisor and the restart scheduler.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::Settings;

/// Receiver half of the reschedule notification channel, consumed by the
/// restart scheduler.
pub type RescheduleReceiver = mpsc::UnboundedReceiver<()>;

/// Thread-safe holder of the mutable resolver settings.
///
/// `get` returns a snapshot under a read lock; `replace` swaps the settings
/// atomically and notifies the restart scheduler exactly once when the
/// refresh period changed. The enabled flag is owned by the supervisor
/// loop: external replacements never clobber it.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    inner: Arc<RwLock<Settings>>,
    reschedule_tx: mpsc::UnboundedSender<()>,
}

impl SettingsStore {
    /// Create a store with the given initial settings, returning the
    /// reschedule receiver for [`crate::scheduler::RestartScheduler`].
    pub fn new(initial: Settings) -> (Self, RescheduleReceiver) {
        let (reschedule_tx, reschedule_rx) = mpsc::unbounded_channel();
        let store = Self {
            inner: Arc::new(RwLock::new(initial)),
            reschedule_tx,
        };
        (store, reschedule_rx)
    }

    /// Snapshot of the current settings.
    pub fn get(&self) -> Settings {
        self.inner.read().clone()
    }

    /// Replace the settings wholesale, keeping the current enabled flag.
    ///
    /// Sends one reschedule notification if the refresh period differed.
    pub fn replace(&self, mut new: Settings) {
        let period_differs;
        {
            let mut guard = self.inner.write();
            new.enabled = guard.enabled;
            period_differs = guard.refresh_period != new.refresh_period;
            *guard = new;
        }
        if period_differs {
            debug!("refresh period changed, notifying restart scheduler");
            let _ = self.reschedule_tx.send(());
        }
    }

    /// Whether the resolver is currently enabled.
    pub(crate) fn is_enabled(&self) -> bool {
        self.inner.read().enabled
    }

    /// Set the enabled flag. Only the supervisor loop calls this.
    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.inner.write().enabled = enabled;
    }
}
