//! Collaborator contracts for resolver configuration and process control.
//!
//! The supervisor does not generate resolver configuration, download trust
//! material or spawn the resolver binary itself; it drives an external
//! [`Configurator`] through those steps and owns the resulting process
//! handle.

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use std::net::IpAddr;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::{LocalSubnet, Settings};
use crate::error::BoxError;

/// Lines of resolver process output.
pub type OutputStream = BoxStream<'static, String>;

/// Resolves once the resolver process has exited, with its exit error.
pub type ExitFuture = BoxFuture<'static, Result<(), BoxError>>;

/// Prepares, launches and monitors the resolver process, and switches the
/// host's DNS resolution targets.
#[async_trait]
pub trait Configurator: Send + Sync + 'static {
    /// Download the root hints file. Must return promptly once `cancel`
    /// fires.
    async fn download_root_hints(
        &self,
        cancel: CancellationToken,
        uid: u32,
        gid: u32,
    ) -> Result<(), BoxError>;

    /// Download the DNSSEC root key. Must return promptly once `cancel`
    /// fires.
    async fn download_root_key(
        &self,
        cancel: CancellationToken,
        uid: u32,
        gid: u32,
    ) -> Result<(), BoxError>;

    /// Generate the resolver configuration file. Must return promptly once
    /// `cancel` fires.
    async fn build_config(
        &self,
        cancel: CancellationToken,
        settings: &Settings,
        subnet: &LocalSubnet,
        uid: u32,
        gid: u32,
    ) -> Result<(), BoxError>;

    /// Launch the resolver process. The process must stop when `cancel`
    /// fires; the returned future resolves when it has exited.
    async fn start(
        &self,
        cancel: CancellationToken,
        verbosity: u8,
    ) -> Result<(OutputStream, ExitFuture), BoxError>;

    /// Point the gateway's own resolution at `address`.
    fn use_dns_internally(&self, address: IpAddr);

    /// Point system-wide resolution at `address`.
    fn use_dns_system_wide(&self, address: IpAddr, keep_nameserver: bool) -> Result<(), BoxError>;

    /// Block until the resolver reliably answers queries.
    async fn wait_for_ready(&self) -> Result<(), BoxError>;
}

/// Merges resolver output into the gateway's log stream. Fire-and-forget
/// relative to the supervisor loop.
#[async_trait]
pub trait LogMerger: Send + Sync + 'static {
    /// Consume `stream` until it ends or `cancel` fires.
    async fn merge(&self, cancel: CancellationToken, stream: OutputStream, name: &'static str);
}

/// Handle to the currently running resolver instance.
///
/// Single-owner: the supervisor loop is the only holder, the only caller of
/// [`ProcessHandle::teardown`] and the only consumer of the exit signal.
/// Teardown consumes the handle, so the exit signal cannot be drained
/// twice.
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    /// Cancels the resolver process and its output-merge task.
    pub(crate) cancel: CancellationToken,
    /// Receives the process exit result exactly once.
    pub(crate) exit: oneshot::Receiver<Result<(), BoxError>>,
}

impl ProcessHandle {
    /// Cancel the process and block until its exit signal arrives.
    pub(crate) async fn teardown(self) {
        self.cancel.cancel();
        let _ = self.exit.await;
    }
}
