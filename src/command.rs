//! Control commands and the external supervisor handle.

use tokio::sync::mpsc;

use crate::config::Settings;
use crate::metrics::RestartReason;
use crate::settings::SettingsStore;

/// Command consumed by the supervisor loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Enable and start the resolver.
    Start,
    /// Stop the resolver and disable it.
    Stop,
    /// Tear down and rebuild the running resolver. The reason labels the
    /// restart metric, recorded by the loop only when a restart actually
    /// happens.
    Restart(RestartReason),
}

/// Cloneable handle for controlling the supervisor from the rest of the
/// gateway.
///
/// The command channel has a single slot, so `start`/`stop`/`restart`
/// resolve once the loop has accepted the command (not once it has been
/// processed). That blocking handoff is the serialization point preventing
/// command storms.
#[derive(Debug, Clone)]
pub struct SupervisorHandle {
    commands: mpsc::Sender<Command>,
    store: SettingsStore,
}

impl SupervisorHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, store: SettingsStore) -> Self {
        Self { commands, store }
    }

    /// Enable and start the resolver.
    pub async fn start(&self) {
        let _ = self.commands.send(Command::Start).await;
    }

    /// Stop the resolver and mark it disabled.
    pub async fn stop(&self) {
        let _ = self.commands.send(Command::Stop).await;
    }

    /// Restart the resolver. A restart received while disabled is a no-op
    /// and is not counted.
    pub async fn restart(&self) {
        let _ = self.commands.send(Command::Restart(RestartReason::Command)).await;
    }

    /// Snapshot of the current settings.
    pub fn get_settings(&self) -> Settings {
        self.store.get()
    }

    /// Replace the settings. The refresh timer is rescheduled when the
    /// period changed; the enabled flag is left to the supervisor loop.
    pub fn replace_settings(&self, settings: Settings) {
        self.store.replace(settings);
    }
}
