//! MAC address lookup from the neighbour (ARP) table
//!
//! Reads `/proc/net/arp` where it exists and falls back to `arp -n <ip>`.
//! Only hosts we have recently talked to are in the table, so a missing
//! entry is normal and yields `None`.

use std::net::IpAddr;
use std::process::Stdio;
use std::time::Duration;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::process::Command;

static MAC_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9A-Fa-f]{2}[:-]){5}([0-9A-Fa-f]{2})$").expect("valid MAC regex")
});

const PROC_ARP: &str = "/proc/net/arp";

/// Look up the hardware address of `ip`, normalised to `AA:BB:CC:DD:EE:FF`
pub async fn lookup_mac(ip: IpAddr, timeout: Duration) -> Option<String> {
    // ARP only covers IPv4 neighbours
    if ip.is_ipv6() {
        return None;
    }

    if let Ok(table) = tokio::fs::read_to_string(PROC_ARP).await {
        return parse_proc_arp(&table, ip);
    }

    let mut cmd = Command::new("arp");
    cmd.arg("-n")
        .arg(ip.to_string())
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => parse_arp_output(&String::from_utf8_lossy(&output.stdout), ip),
        Ok(Err(e)) => {
            debug!("arp lookup for {} failed: {}", ip, e);
            None
        }
        Err(_) => {
            debug!("arp lookup for {} timed out", ip);
            None
        }
    }
}

/// Find `ip` in the contents of `/proc/net/arp`
pub fn parse_proc_arp(table: &str, ip: IpAddr) -> Option<String> {
    let wanted = ip.to_string();
    table.lines().skip(1).find_map(|line| {
        let fields: Vec<&str> = line.split_whitespace().collect();
        // IP address, HW type, Flags, HW address, Mask, Device
        if fields.len() < 4 || fields[0] != wanted {
            return None;
        }
        // flag 0x0 is an incomplete entry
        if fields[2] == "0x0" {
            return None;
        }
        normalize_mac(fields[3])
    })
}

/// Find a MAC on the line of `arp -n` output that mentions `ip`
pub fn parse_arp_output(output: &str, ip: IpAddr) -> Option<String> {
    let wanted = ip.to_string();
    let bracketed = format!("({})", wanted);
    output
        .lines()
        .filter(|line| {
            line.split_whitespace()
                .any(|token| token == wanted || token == bracketed)
        })
        .flat_map(|line| line.split_whitespace())
        .find_map(normalize_mac)
}

fn normalize_mac(token: &str) -> Option<String> {
    if !MAC_PATTERN.is_match(token) {
        return None;
    }
    let mac = token.replace('-', ":").to_uppercase();
    if mac == "00:00:00:00:00:00" {
        return None;
    }
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = "\
IP address       HW type     Flags       HW address            Mask     Device
192.168.1.1      0x1         0x2         a4:91:b1:0c:3d:7e     *        eth0
192.168.1.20     0x1         0x0         00:00:00:00:00:00     *        eth0
192.168.1.42     0x1         0x2         00:1b:21:aa:bb:cc     *        eth0
";

    #[test]
    fn test_proc_arp_lookup() {
        let ip: IpAddr = "192.168.1.42".parse().unwrap();
        assert_eq!(parse_proc_arp(TABLE, ip), Some("00:1B:21:AA:BB:CC".to_string()));
    }

    #[test]
    fn test_incomplete_entry_ignored() {
        let ip: IpAddr = "192.168.1.20".parse().unwrap();
        assert_eq!(parse_proc_arp(TABLE, ip), None);
        let ip: IpAddr = "192.168.1.99".parse().unwrap();
        assert_eq!(parse_proc_arp(TABLE, ip), None);
    }

    #[test]
    fn test_arp_command_formats() {
        let linux = "Address HWtype HWaddress Flags Mask Iface\n\
                     10.0.0.5 ether 3c:22:fb:01:02:03 C eth0\n";
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(parse_arp_output(linux, ip), Some("3C:22:FB:01:02:03".to_string()));

        let bsd = "? (10.0.0.5) at 3c-22-fb-01-02-03 on en0 ifscope [ethernet]\n";
        assert_eq!(parse_arp_output(bsd, ip), Some("3C:22:FB:01:02:03".to_string()));

        let missing = "10.0.0.5 (10.0.0.5) -- no entry\n";
        assert_eq!(parse_arp_output(missing, ip), None);
    }

    #[test]
    fn test_other_hosts_not_matched() {
        let output = "10.0.0.50 ether 3c:22:fb:01:02:03 C eth0\n";
        let ip: IpAddr = "10.0.0.5".parse().unwrap();
        assert_eq!(parse_arp_output(output, ip), None);
    }
}
