//! Configuration types for dot-supervisor.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// Runtime settings for the supervised resolver.
///
/// Mutated only through [`crate::settings::SettingsStore::replace`]; the
/// supervisor loop and the restart scheduler read snapshots of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Whether the encrypted resolver should be running.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Plaintext DNS providers, in fallback preference order.
    #[serde(default = "default_providers")]
    pub providers: Vec<Provider>,

    /// Explicit plaintext DNS address, overriding provider selection.
    #[serde(default)]
    pub plaintext_address: Option<IpAddr>,

    /// Keep the existing nameserver entries when switching system DNS.
    #[serde(default)]
    pub keep_nameserver: bool,

    /// Interval at which the resolver is proactively restarted.
    /// Zero disables scheduled restarts.
    #[serde(default = "default_refresh_period")]
    pub refresh_period: Duration,

    /// Verbosity level passed to the resolver process.
    #[serde(default = "default_verbosity")]
    pub verbosity_level: u8,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            providers: default_providers(),
            plaintext_address: None,
            keep_nameserver: false,
            refresh_period: default_refresh_period(),
            verbosity_level: default_verbosity(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_providers() -> Vec<Provider> {
    vec![Provider::Cloudflare]
}

fn default_refresh_period() -> Duration {
    // Daily refresh picks up fresh root trust material.
    Duration::from_secs(24 * 60 * 60)
}

fn default_verbosity() -> u8 {
    1
}

/// Known plaintext DNS providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Cloudflare (1.1.1.1).
    Cloudflare,
    /// Google public DNS (8.8.8.8).
    Google,
    /// Quad9 (9.9.9.9).
    Quad9,
    /// CleanBrowsing security filter.
    CleanBrowsing,
    /// LibreDNS.
    LibreDns,
    /// CIRA Canadian Shield.
    Cira,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cloudflare => "cloudflare",
            Self::Google => "google",
            Self::Quad9 => "quad9",
            Self::CleanBrowsing => "cleanbrowsing",
            Self::LibreDns => "libredns",
            Self::Cira => "cira",
        };
        f.write_str(name)
    }
}

/// Local subnet granted access to the resolver, handed to the
/// configurator when building the resolver configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalSubnet {
    /// Network address.
    pub addr: IpAddr,
    /// Prefix length in bits.
    pub prefix_len: u8,
}

impl fmt::Display for LocalSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix_len)
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "dot_supervisor=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<std::net::SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
