//! Metrics instrumentation for dot-supervisor.
//!
//! All metrics are prefixed with `dot_supervisor.`

use metrics::{counter, gauge};

/// Record a restart of the resolver cycle.
pub fn record_restart(reason: RestartReason) {
    let reason_str = match reason {
        RestartReason::Scheduled => "scheduled",
        RestartReason::Command => "command",
        RestartReason::UnexpectedExit => "unexpected_exit",
    };

    counter!("dot_supervisor.restart.count", "reason" => reason_str).increment(1);
}

/// Why the resolver is being restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// The restart scheduler ticked.
    Scheduled,
    /// An external caller issued a restart command.
    Command,
    /// The resolver process exited on its own.
    UnexpectedExit,
}

/// Record a recoverable failure of a cycle stage.
pub fn record_failure(stage: &'static str) {
    counter!("dot_supervisor.failure.count", "stage" => stage).increment(1);
}

/// Record an engagement of the plaintext fallback.
pub fn record_fallback(source: FallbackSource) {
    let source_str = match source {
        FallbackSource::Explicit => "explicit",
        FallbackSource::Provider => "provider",
        FallbackSource::None => "none",
    };

    counter!("dot_supervisor.fallback.count", "source" => source_str).increment(1);
}

/// Where the fallback address came from.
#[derive(Debug, Clone, Copy)]
pub enum FallbackSource {
    /// Explicitly configured plaintext address.
    Explicit,
    /// First IPv4 address of a configured provider.
    Provider,
    /// No usable address found; DNS left unchanged.
    None,
}

/// Record that the resolver reached readiness.
pub fn record_ready() {
    counter!("dot_supervisor.ready.count").increment(1);
}

/// Record whether the encrypted resolver is currently serving.
pub fn record_resolver_up(up: bool) {
    gauge!("dot_supervisor.resolver.up").set(if up { 1.0 } else { 0.0 });
}

/// Record a reschedule of the restart timer after a period change.
pub fn record_scheduler_reschedule(armed: bool) {
    counter!("dot_supervisor.scheduler.reschedule.count").increment(1);
    gauge!("dot_supervisor.scheduler.armed").set(if armed { 1.0 } else { 0.0 });
}
