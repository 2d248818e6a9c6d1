//! Shared test infrastructure for supervisor integration tests.

use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use dot_supervisor::{
    BoxError, Configurator, ExitFuture, LocalSubnet, LogMerger, OutputStream, Provider, Settings,
    Supervisor, SupervisorHandle,
};

// --- Constants ---

pub const UID: u32 = 1000;
pub const GID: u32 = 1000;

// --- Call recording ---

/// One observed configurator call, with the (paused-clock) time it was made.
#[derive(Debug)]
pub struct CallRecord {
    pub call: Call,
    pub at: Instant,
}

/// Configurator calls and process exits, in observation order.
#[derive(Debug, PartialEq, Eq)]
pub enum Call {
    RootHints,
    RootKey,
    BuildConfig,
    Start,
    UseInternal(IpAddr),
    UseSystemWide(IpAddr, bool),
    WaitForReady,
    ProcessExited,
}

// --- MockConfigurator ---

/// Scripted configurator: every call is pushed onto an event channel so
/// tests can await the supervisor's progress deterministically, which is
/// what lets the paused clock auto-advance through the 10 s backoff.
pub struct MockConfigurator {
    events: mpsc::UnboundedSender<CallRecord>,
    setup_failures: AtomicUsize,
    setup_stalls: AtomicUsize,
    launch_failures: AtomicUsize,
    readiness_failures: AtomicUsize,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    kill: Mutex<Option<oneshot::Sender<BoxError>>>,
}

impl MockConfigurator {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<CallRecord>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let mock = Arc::new(Self {
            events,
            setup_failures: AtomicUsize::new(0),
            setup_stalls: AtomicUsize::new(0),
            launch_failures: AtomicUsize::new(0),
            readiness_failures: AtomicUsize::new(0),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
            kill: Mutex::new(None),
        });
        (mock, events_rx)
    }

    /// Fail the next `n` root-hints downloads.
    pub fn fail_setups(&self, n: usize) {
        self.setup_failures.store(n, Ordering::SeqCst);
    }

    /// Stall the next `n` root-hints downloads until their cancellation
    /// token fires.
    pub fn stall_setups(&self, n: usize) {
        self.setup_stalls.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` process launches.
    pub fn fail_launches(&self, n: usize) {
        self.launch_failures.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` readiness waits.
    pub fn fail_readiness(&self, n: usize) {
        self.readiness_failures.store(n, Ordering::SeqCst);
    }

    /// Make the current resolver process exit with an error.
    pub fn kill_process(&self, reason: &str) {
        if let Some(kill) = self.kill.lock().take() {
            let _ = kill.send(reason.to_string().into());
        }
    }

    /// Number of resolver processes currently alive.
    pub fn live_processes(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneously alive resolver processes.
    pub fn max_live_processes(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        let _ = self.events.send(CallRecord {
            call,
            at: Instant::now(),
        });
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Configurator for MockConfigurator {
    async fn download_root_hints(
        &self,
        cancel: CancellationToken,
        _uid: u32,
        _gid: u32,
    ) -> Result<(), BoxError> {
        self.record(Call::RootHints);
        if Self::take_failure(&self.setup_stalls) {
            cancel.cancelled().await;
            return Err("root hints download aborted".into());
        }
        if Self::take_failure(&self.setup_failures) {
            return Err("root hints download refused".into());
        }
        Ok(())
    }

    async fn download_root_key(
        &self,
        _cancel: CancellationToken,
        _uid: u32,
        _gid: u32,
    ) -> Result<(), BoxError> {
        self.record(Call::RootKey);
        Ok(())
    }

    async fn build_config(
        &self,
        _cancel: CancellationToken,
        _settings: &Settings,
        _subnet: &LocalSubnet,
        _uid: u32,
        _gid: u32,
    ) -> Result<(), BoxError> {
        self.record(Call::BuildConfig);
        Ok(())
    }

    async fn start(
        &self,
        cancel: CancellationToken,
        _verbosity: u8,
    ) -> Result<(OutputStream, ExitFuture), BoxError> {
        self.record(Call::Start);
        if Self::take_failure(&self.launch_failures) {
            return Err("bind: address already in use".into());
        }

        let (kill_tx, kill_rx) = oneshot::channel();
        *self.kill.lock() = Some(kill_tx);

        let live = Arc::clone(&self.live);
        let max_live = Arc::clone(&self.max_live);
        let count = live.fetch_add(1, Ordering::SeqCst) + 1;
        max_live.fetch_max(count, Ordering::SeqCst);

        let events = self.events.clone();
        let exit: ExitFuture = Box::pin(async move {
            let result = tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                reason = kill_rx => Err(reason.unwrap_or_else(|_| "killed".into())),
            };
            live.fetch_sub(1, Ordering::SeqCst);
            let _ = events.send(CallRecord {
                call: Call::ProcessExited,
                at: Instant::now(),
            });
            result
        });

        let output: OutputStream = stream::iter(vec!["resolver listening".to_string()])
            .chain(stream::pending())
            .boxed();

        Ok((output, exit))
    }

    fn use_dns_internally(&self, address: IpAddr) {
        self.record(Call::UseInternal(address));
    }

    fn use_dns_system_wide(&self, address: IpAddr, keep_nameserver: bool) -> Result<(), BoxError> {
        self.record(Call::UseSystemWide(address, keep_nameserver));
        Ok(())
    }

    async fn wait_for_ready(&self) -> Result<(), BoxError> {
        self.record(Call::WaitForReady);
        if Self::take_failure(&self.readiness_failures) {
            return Err("readiness probe timed out".into());
        }
        Ok(())
    }
}

// --- RecordingMerger ---

/// Collects resolver output lines until the process token fires.
#[derive(Default)]
pub struct RecordingMerger {
    pub lines: Mutex<Vec<String>>,
}

#[async_trait]
impl LogMerger for RecordingMerger {
    async fn merge(&self, cancel: CancellationToken, mut stream: OutputStream, _name: &'static str) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                line = stream.next() => match line {
                    Some(line) => self.lines.lock().push(line),
                    None => return,
                },
            }
        }
    }
}

// --- Settings and harness builders ---

pub fn test_subnet() -> LocalSubnet {
    LocalSubnet {
        addr: "10.0.0.0".parse().unwrap(),
        prefix_len: 8,
    }
}

pub fn test_settings() -> Settings {
    Settings {
        enabled: true,
        providers: vec![Provider::Cloudflare],
        plaintext_address: None,
        keep_nameserver: false,
        refresh_period: std::time::Duration::from_secs(3600),
        verbosity_level: 1,
    }
}

/// Everything a lifecycle test needs to drive the supervisor.
pub struct Harness {
    pub conf: Arc<MockConfigurator>,
    pub merger: Arc<RecordingMerger>,
    pub handle: SupervisorHandle,
    pub cancel: CancellationToken,
    pub events: mpsc::UnboundedReceiver<CallRecord>,
    pub ready: mpsc::UnboundedReceiver<()>,
    pub join: tokio::task::JoinHandle<()>,
}

impl Harness {
    /// Next configurator call, panicking if the supervisor stopped.
    pub async fn next_call(&mut self) -> Call {
        self.events
            .recv()
            .await
            .expect("supervisor stopped emitting events")
            .call
    }

    /// Next configurator call with its timestamp.
    pub async fn next_record(&mut self) -> CallRecord {
        self.events
            .recv()
            .await
            .expect("supervisor stopped emitting events")
    }

    /// Assert the next calls are a full setup+launch+readiness cycle and
    /// return the timestamp of the root-hints call.
    pub async fn expect_full_cycle(&mut self) -> Instant {
        let first = self.next_record().await;
        assert_eq!(first.call, Call::RootHints);
        assert_eq!(self.next_call().await, Call::RootKey);
        assert_eq!(self.next_call().await, Call::BuildConfig);
        assert_eq!(self.next_call().await, Call::Start);
        assert_eq!(
            self.next_call().await,
            Call::UseInternal("127.0.0.1".parse().unwrap())
        );
        assert_eq!(
            self.next_call().await,
            Call::UseSystemWide("127.0.0.1".parse().unwrap(), false)
        );
        assert_eq!(self.next_call().await, Call::WaitForReady);
        first.at
    }

    /// Consume the plaintext DNS engagement the loop performs on startup.
    pub async fn expect_initial_plaintext(&mut self, address: &str) {
        let address: IpAddr = address.parse().unwrap();
        assert_eq!(self.next_call().await, Call::UseInternal(address));
        assert_eq!(self.next_call().await, Call::UseSystemWide(address, false));
    }
}

/// Spawn a supervisor over the mock configurator with the given settings.
pub fn spawn_supervisor(settings: Settings) -> Harness {
    let (conf, events) = MockConfigurator::new();
    let merger = Arc::new(RecordingMerger::default());

    let (supervisor, _scheduler, handle) = Supervisor::new(
        Arc::clone(&conf),
        Arc::clone(&merger),
        settings,
        test_subnet(),
        UID,
        GID,
    );

    let cancel = CancellationToken::new();
    let (ready_tx, ready) = mpsc::unbounded_channel();
    let join = tokio::spawn(supervisor.run(cancel.clone(), move || {
        let _ = ready_tx.send(());
    }));

    Harness {
        conf,
        merger,
        handle,
        cancel,
        events,
        ready,
        join,
    }
}
