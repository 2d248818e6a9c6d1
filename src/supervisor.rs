//! Supervisor loop for the encrypted resolver process.

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::command::{Command, SupervisorHandle};
use crate::config::{LocalSubnet, Settings};
use crate::configurator::{Configurator, LogMerger, ProcessHandle};
use crate::error::{BoxError, SupervisorError};
use crate::fallback::select_fallback;
use crate::metrics::{self, FallbackSource, RestartReason};
use crate::providers::ProviderDirectory;
use crate::scheduler::RestartScheduler;
use crate::settings::SettingsStore;

/// The resolver is always addressed at loopback when active.
pub const RESOLVER_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Backoff before retrying a failed setup/launch/readiness cycle.
const RETRY_WAIT: Duration = Duration::from_secs(10);

/// What happened while the resolver was active.
enum ActiveEvent {
    Cancelled,
    Command(Command),
    CommandsClosed,
    Exited(Result<(), BoxError>),
}

/// Drives the resolver through setup, launch and readiness, switches the
/// host's DNS target, and recovers from failures with a plaintext fallback
/// and a fixed backoff.
///
/// At most one resolver process is ever alive: a previous instance is
/// always cancelled and its exit signal drained before the next launch.
pub struct Supervisor<C, M> {
    conf: Arc<C>,
    merger: Arc<M>,
    directory: ProviderDirectory,
    store: SettingsStore,
    commands: mpsc::Receiver<Command>,
    subnet: LocalSubnet,
    uid: u32,
    gid: u32,
}

impl<C: Configurator, M: LogMerger> Supervisor<C, M> {
    /// Build the supervisor together with its restart scheduler and the
    /// external control handle. The scheduler feeds `Restart` commands
    /// into the same single-slot channel the handle uses.
    pub fn new(
        conf: Arc<C>,
        merger: Arc<M>,
        initial: Settings,
        subnet: LocalSubnet,
        uid: u32,
        gid: u32,
    ) -> (Self, RestartScheduler, SupervisorHandle) {
        let (store, reschedule_rx) = SettingsStore::new(initial);
        let (command_tx, command_rx) = mpsc::channel(1);

        let scheduler = RestartScheduler::new(store.clone(), reschedule_rx, command_tx.clone());
        let handle = SupervisorHandle::new(command_tx, store.clone());
        let supervisor = Self {
            conf,
            merger,
            directory: ProviderDirectory::builtin(),
            store,
            commands: command_rx,
            subnet,
            uid,
            gid,
        };
        (supervisor, scheduler, handle)
    }

    /// Override the plaintext provider directory.
    pub fn with_provider_directory(mut self, directory: ProviderDirectory) -> Self {
        self.directory = directory;
        self
    }

    /// Run the loop until `cancel` fires or every command sender is gone.
    ///
    /// `on_ready` is invoked once per successful transition into the
    /// active state, and once per `Restart` received while disabled so
    /// callers blocked on readiness are not left hanging.
    pub async fn run<F>(mut self, cancel: CancellationToken, on_ready: F)
    where
        F: Fn() + Send,
    {
        // Point DNS at the plaintext target until the resolver is up.
        self.use_plaintext_dns(false);

        if !self.wait_for_first_enable(&cancel, &on_ready).await {
            return;
        }

        // Handle of a previous instance whose teardown was deferred by a
        // restart; completed at the top of the next cycle.
        let mut draining: Option<ProcessHandle> = None;

        while !cancel.is_cancelled() {
            if !self.wait_for_reenable(&cancel, &on_ready, &mut draining).await {
                break;
            }

            let settings = self.store.get();

            if let Some(previous) = draining.take() {
                debug!("draining previous resolver instance");
                previous.teardown().await;
            }

            // Setup
            if let Err(err) = self.setup(&cancel, &settings).await {
                metrics::record_failure(err.stage());
                self.log_and_wait(&cancel, &err).await;
                continue;
            }

            // Launch
            let process_cancel = CancellationToken::new();
            let (stream, exit) = match self
                .conf
                .start(process_cancel.clone(), settings.verbosity_level)
                .await
            {
                Ok(parts) => parts,
                Err(source) => {
                    process_cancel.cancel();
                    let err = SupervisorError::Launch(source);
                    metrics::record_failure(err.stage());
                    self.use_plaintext_dns(true);
                    self.log_and_wait(&cancel, &err).await;
                    continue;
                }
            };

            // Started: merge its output in the background and spawn the
            // exit waiter. The loop is the sole consumer of `exit_rx`.
            let merger = Arc::clone(&self.merger);
            let merge_cancel = process_cancel.clone();
            tokio::spawn(async move { merger.merge(merge_cancel, stream, "resolver").await });

            let (exit_tx, exit_rx) = oneshot::channel();
            tokio::spawn(async move {
                let result = exit.await;
                let _ = exit_tx.send(result);
            });
            let mut handle = ProcessHandle {
                cancel: process_cancel,
                exit: exit_rx,
            };

            self.conf.use_dns_internally(RESOLVER_ADDRESS);
            if let Err(err) = self
                .conf
                .use_dns_system_wide(RESOLVER_ADDRESS, settings.keep_nameserver)
            {
                error!(error = %err, "failed to switch system-wide DNS");
            }

            // Readiness
            if let Err(source) = self.conf.wait_for_ready().await {
                let err = SupervisorError::Readiness(source);
                metrics::record_failure(err.stage());
                handle.teardown().await;
                self.use_plaintext_dns(true);
                self.log_and_wait(&cancel, &err).await;
                continue;
            }

            info!("encrypted DNS resolver is ready");
            metrics::record_ready();
            metrics::record_resolver_up(true);
            on_ready();

            // Active
            draining = loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => ActiveEvent::Cancelled,
                    exit = &mut handle.exit => ActiveEvent::Exited(flatten_exit(exit)),
                    cmd = self.commands.recv() => match cmd {
                        Some(cmd) => ActiveEvent::Command(cmd),
                        None => ActiveEvent::CommandsClosed,
                    },
                };

                match event {
                    ActiveEvent::Cancelled => {
                        warn!("cancellation received: exiting loop");
                        metrics::record_resolver_up(false);
                        handle.teardown().await;
                        warn!("loop exited");
                        return;
                    }
                    ActiveEvent::CommandsClosed => {
                        warn!("all command handles dropped: exiting loop");
                        metrics::record_resolver_up(false);
                        handle.teardown().await;
                        warn!("loop exited");
                        return;
                    }
                    ActiveEvent::Command(Command::Start) => {
                        info!("already started");
                    }
                    ActiveEvent::Command(Command::Restart(reason)) => {
                        info!("restarting");
                        metrics::record_restart(reason);
                        metrics::record_resolver_up(false);
                        // Teardown is deferred to the top of the next
                        // cycle so in-flight setup work is not duplicated.
                        break Some(handle);
                    }
                    ActiveEvent::Command(Command::Stop) => {
                        info!("stopping");
                        metrics::record_resolver_up(false);
                        handle.teardown().await;
                        self.store.set_enabled(false);
                        break None;
                    }
                    ActiveEvent::Exited(result) => {
                        metrics::record_resolver_up(false);
                        metrics::record_restart(RestartReason::UnexpectedExit);
                        // Exit signal already consumed; cancel stops the
                        // output-merge task.
                        handle.cancel.cancel();
                        let source: BoxError = match result {
                            Ok(()) => "resolver exited".into(),
                            Err(err) => err,
                        };
                        let err = SupervisorError::RuntimeExit(source);
                        metrics::record_failure(err.stage());
                        self.use_plaintext_dns(true);
                        self.log_and_wait(&cancel, &err).await;
                        break None;
                    }
                }
            };
        }

        if let Some(previous) = draining.take() {
            previous.teardown().await;
        }
        warn!("loop exited");
    }

    /// Park until the first enabling command. Returns false on
    /// cancellation or channel closure.
    async fn wait_for_first_enable<F>(&mut self, cancel: &CancellationToken, on_ready: &F) -> bool
    where
        F: Fn() + Send,
    {
        loop {
            let cmd = tokio::select! {
                _ = cancel.cancelled() => return false,
                cmd = self.commands.recv() => cmd,
            };
            match cmd {
                None => return false,
                Some(Command::Stop) => {
                    self.store.set_enabled(false);
                    info!("not started yet");
                }
                Some(Command::Restart(_)) => {
                    if self.store.is_enabled() {
                        return true;
                    }
                    // Unblock callers waiting on readiness.
                    on_ready();
                    info!("not restarting because disabled");
                }
                Some(Command::Start) => {
                    self.store.set_enabled(true);
                    return true;
                }
            }
        }
    }

    /// Park while disabled, until re-enabled. Completes any deferred
    /// teardown before bailing out on cancellation.
    async fn wait_for_reenable<F>(
        &mut self,
        cancel: &CancellationToken,
        on_ready: &F,
        draining: &mut Option<ProcessHandle>,
    ) -> bool
    where
        F: Fn() + Send,
    {
        if self.store.is_enabled() {
            return true;
        }
        loop {
            let cmd = tokio::select! {
                _ = cancel.cancelled() => {
                    if let Some(previous) = draining.take() {
                        previous.teardown().await;
                    }
                    return false;
                }
                cmd = self.commands.recv() => cmd,
            };
            match cmd {
                None => {
                    if let Some(previous) = draining.take() {
                        previous.teardown().await;
                    }
                    return false;
                }
                Some(Command::Stop) => {
                    info!("already disabled");
                }
                Some(Command::Restart(_)) => {
                    if self.store.is_enabled() {
                        return true;
                    }
                    on_ready();
                    info!("not restarting because disabled");
                }
                Some(Command::Start) => {
                    self.store.set_enabled(true);
                    return true;
                }
            }
        }
    }

    /// Root hints, root key, then config generation, in order. Each step
    /// carries the loop's cancellation token so a stalled download cannot
    /// outlive the loop.
    async fn setup(
        &self,
        cancel: &CancellationToken,
        settings: &Settings,
    ) -> Result<(), SupervisorError> {
        self.conf
            .download_root_hints(cancel.clone(), self.uid, self.gid)
            .await
            .map_err(SupervisorError::Setup)?;
        self.conf
            .download_root_key(cancel.clone(), self.uid, self.gid)
            .await
            .map_err(SupervisorError::Setup)?;
        self.conf
            .build_config(cancel.clone(), settings, &self.subnet, self.uid, self.gid)
            .await
            .map_err(SupervisorError::Setup)?;
        Ok(())
    }

    /// Point internal and system-wide DNS at a plaintext target.
    ///
    /// With no usable IPv4 address the error is logged and system DNS is
    /// left unchanged.
    fn use_plaintext_dns(&self, fallback: bool) {
        let settings = self.store.get();
        let source = if settings.plaintext_address.is_some() {
            FallbackSource::Explicit
        } else {
            FallbackSource::Provider
        };

        match select_fallback(&settings, &self.directory) {
            Some(address) => {
                if fallback {
                    info!(%address, "falling back on plaintext DNS");
                    metrics::record_fallback(source);
                } else {
                    info!(%address, "using plaintext DNS");
                }
                self.conf.use_dns_internally(address);
                if let Err(err) = self
                    .conf
                    .use_dns_system_wide(address, settings.keep_nameserver)
                {
                    error!(error = %err, "failed to switch system-wide DNS");
                }
            }
            None => {
                error!(
                    providers = ?settings.providers,
                    "no IPv4 DNS address found for providers"
                );
                if fallback {
                    metrics::record_fallback(FallbackSource::None);
                }
            }
        }
    }

    /// Log the failure and wait out the retry backoff, interruptible by
    /// cancellation.
    async fn log_and_wait(&self, cancel: &CancellationToken, err: &SupervisorError) {
        warn!(error = %err, "resolver cycle failed");
        info!("attempting restart in 10 seconds");
        tokio::select! {
            _ = tokio::time::sleep(RETRY_WAIT) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

fn flatten_exit(
    exit: Result<Result<(), BoxError>, oneshot::error::RecvError>,
) -> Result<(), BoxError> {
    match exit {
        Ok(result) => result,
        Err(_) => Err("exit waiter dropped".into()),
    }
}
