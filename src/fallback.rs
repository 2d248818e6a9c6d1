//! Plaintext fallback target selection.

use std::net::IpAddr;

use crate::config::Settings;
use crate::providers::ProviderDirectory;

/// Choose a plaintext DNS target for when the encrypted resolver is
/// unavailable.
///
/// An explicitly configured plaintext address always wins. Otherwise the
/// providers are scanned in configured order and the first IPv4 address in
/// a provider's list is taken. Returns `None` when no IPv4 address exists;
/// the caller logs the operational error and leaves system DNS unchanged.
pub fn select_fallback(settings: &Settings, directory: &ProviderDirectory) -> Option<IpAddr> {
    if let Some(address) = settings.plaintext_address {
        return Some(address);
    }

    for provider in &settings.providers {
        for address in directory.addresses(*provider) {
            if address.is_ipv4() {
                return Some(*address);
            }
        }
    }

    None
}
