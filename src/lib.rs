//! dot-supervisor - Lifecycle supervision for a local encrypted DNS resolver.
//!
//! This crate supervises the encrypted (DNS-over-TLS) resolver process of a
//! network gateway. It sequences setup, launch and readiness through an
//! external [`Configurator`], switches the host's effective DNS target
//! between the local resolver and a plaintext fallback, and restarts the
//! resolver on a configurable refresh period.
//!
//! ## Features
//!
//! - Start/stop/restart control surface with blocking command handoff
//! - Periodic resolver refresh with mid-wait rescheduling
//! - Plaintext fallback selection from a provider directory
//! - Automatic recovery with a fixed backoff after any failure
//! - Graceful shutdown support
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        dot-supervisor                            │
//! │                                                                  │
//! │  callers ──commands──▶ ┌──────────────────┐   ┌───────────────┐  │
//! │  (start/stop/restart)  │  Supervisor loop │──▶│ Configurator  │  │
//! │                        │  (state machine) │   │ (setup/launch │  │
//! │  ┌─────────────────┐   └────────┬─────────┘   │  /DNS switch) │  │
//! │  │ RestartScheduler│──Restart──▶│             └───────────────┘  │
//! │  │ (refresh timer) │            ▼                                │
//! │  └────────▲────────┘   ┌──────────────────┐                      │
//! │           │reschedule  │  resolver proc   │── output ─▶ merger   │
//! │  ┌────────┴────────┐   │  (127.0.0.1:53)  │                      │
//! │  │  SettingsStore  │   └──────────────────┘                      │
//! │  └─────────────────┘                                             │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```rust,ignore
//! use dot_supervisor::{LocalSubnet, Settings, Supervisor};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let subnet = LocalSubnet {
//!         addr: "10.0.0.0".parse().unwrap(),
//!         prefix_len: 8,
//!     };
//!     let (supervisor, scheduler, handle) = Supervisor::new(
//!         Arc::new(my_configurator),
//!         Arc::new(my_merger),
//!         Settings::default(),
//!         subnet,
//!         1000,
//!         1000,
//!     );
//!
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(scheduler.run(cancel.clone()));
//!     tokio::spawn(supervisor.run(cancel.clone(), || println!("DNS ready")));
//!
//!     handle.start().await;
//! }
//! ```

#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod configurator;
pub mod error;
pub mod fallback;
pub mod metrics;
pub mod providers;
pub mod scheduler;
pub mod settings;
pub mod supervisor;
pub mod telemetry;

// Re-export main types
pub use command::{Command, SupervisorHandle};
pub use config::{LocalSubnet, Provider, Settings, TelemetryConfig};
pub use configurator::{Configurator, ExitFuture, LogMerger, OutputStream};
pub use error::{BoxError, SupervisorError};
pub use metrics::RestartReason;
pub use providers::ProviderDirectory;
pub use scheduler::RestartScheduler;
pub use settings::SettingsStore;
pub use supervisor::{Supervisor, RESOLVER_ADDRESS};
