//! Reverse DNS lookups

use std::net::IpAddr;
use std::time::Duration;

use log::debug;

/// Resolve the PTR name of `ip`, giving up after `timeout`.
///
/// The resolver call blocks, so it runs on the blocking pool. A timed-out
/// lookup keeps running there until the system resolver returns.
pub async fn reverse_lookup(ip: IpAddr, timeout: Duration) -> Option<String> {
    let lookup = tokio::task::spawn_blocking(move || dns_lookup::lookup_addr(&ip));

    match tokio::time::timeout(timeout, lookup).await {
        Ok(Ok(Ok(name))) => clean_hostname(&name, ip),
        Ok(Ok(Err(e))) => {
            debug!("No PTR record for {}: {}", ip, e);
            None
        }
        Ok(Err(e)) => {
            debug!("Reverse lookup task for {} failed: {}", ip, e);
            None
        }
        Err(_) => {
            debug!("Reverse lookup for {} timed out", ip);
            None
        }
    }
}

/// Drop trailing dots and numeric echoes of the address itself
fn clean_hostname(name: &str, ip: IpAddr) -> Option<String> {
    let name = name.trim().trim_end_matches('.');
    if name.is_empty() || name.parse::<IpAddr>().map_or(false, |parsed| parsed == ip) {
        return None;
    }
    Some(name.to_string())
}
