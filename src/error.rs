//! Error types for dot-supervisor.

use thiserror::Error;

/// Opaque error produced by external collaborators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Failures the supervisor loop recovers from.
///
/// Every variant is logged, answered with the plaintext fallback where a
/// process was involved, and followed by a 10 second backoff and a full
/// retry of the setup cycle. None of them terminate the loop.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// Trust-data download or config generation failed.
    #[error("resolver setup failed: {0}")]
    Setup(#[source] BoxError),

    /// The resolver process failed to start.
    #[error("resolver failed to launch: {0}")]
    Launch(#[source] BoxError),

    /// The resolver started but never signaled readiness.
    #[error("resolver never became ready: {0}")]
    Readiness(#[source] BoxError),

    /// The resolver exited unexpectedly while active.
    #[error("resolver exited unexpectedly: {0}")]
    RuntimeExit(#[source] BoxError),
}

impl SupervisorError {
    /// Stable label for metrics.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Setup(_) => "setup",
            Self::Launch(_) => "launch",
            Self::Readiness(_) => "readiness",
            Self::RuntimeExit(_) => "runtime_exit",
        }
    }
}
