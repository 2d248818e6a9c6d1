//! Built-in plaintext DNS provider directory.

use std::collections::HashMap;
use std::net::IpAddr;

use crate::config::Provider;

/// Maps providers to their published anycast addresses, in the order the
/// fallback selector should try them.
#[derive(Debug, Clone)]
pub struct ProviderDirectory {
    entries: HashMap<Provider, Vec<IpAddr>>,
}

impl ProviderDirectory {
    /// Directory of well-known public resolvers.
    pub fn builtin() -> Self {
        let mut entries = HashMap::new();
        entries.insert(
            Provider::Cloudflare,
            parse_all(&["1.1.1.1", "1.0.0.1", "2606:4700:4700::1111", "2606:4700:4700::1001"]),
        );
        entries.insert(
            Provider::Google,
            parse_all(&["8.8.8.8", "8.8.4.4", "2001:4860:4860::8888", "2001:4860:4860::8844"]),
        );
        entries.insert(
            Provider::Quad9,
            parse_all(&["9.9.9.9", "149.112.112.112", "2620:fe::fe", "2620:fe::9"]),
        );
        entries.insert(
            Provider::CleanBrowsing,
            parse_all(&["185.228.168.9", "185.228.169.9", "2a0d:2a00:1::2", "2a0d:2a00:2::2"]),
        );
        entries.insert(Provider::LibreDns, parse_all(&["116.202.176.26"]));
        entries.insert(
            Provider::Cira,
            parse_all(&["149.112.121.10", "149.112.122.10", "2620:10a:80bb::10", "2620:10a:80bc::10"]),
        );
        Self { entries }
    }

    /// Empty directory, for building custom mappings.
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Set the address list for a provider.
    pub fn insert(&mut self, provider: Provider, addresses: Vec<IpAddr>) {
        self.entries.insert(provider, addresses);
    }

    /// Addresses for a provider, empty if unknown.
    pub fn addresses(&self, provider: Provider) -> &[IpAddr] {
        self.entries
            .get(&provider)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

impl Default for ProviderDirectory {
    fn default() -> Self {
        Self::builtin()
    }
}

fn parse_all(addresses: &[&str]) -> Vec<IpAddr> {
    addresses
        .iter()
        .map(|a| a.parse().expect("invalid built-in provider address"))
        .collect()
}
