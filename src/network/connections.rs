//! Local established-connection table
//!
//! A snapshot of `netstat -tn` used as traffic evidence: a local process
//! talking to a scanned host on a mining port is a strong hint that the
//! host is a pool or proxy for miners on this machine's network.

use std::net::{IpAddr, SocketAddr};
use std::process::Stdio;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use tokio::process::Command;

/// One established TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

/// Read the established TCP connections of this machine
pub async fn established_connections(timeout: Duration) -> Vec<Connection> {
    let mut cmd = Command::new("netstat");
    cmd.arg("-tn")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => parse_netstat(&String::from_utf8_lossy(&output.stdout)),
        Ok(Err(e)) => {
            debug!("netstat unavailable: {}", e);
            Vec::new()
        }
        Err(_) => {
            debug!("netstat timed out");
            Vec::new()
        }
    }
}

/// Parse `netstat -tn` output, keeping ESTABLISHED rows
pub fn parse_netstat(output: &str) -> Vec<Connection> {
    output
        .lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 6 || !fields[0].starts_with("tcp") || fields[5] != "ESTABLISHED" {
                return None;
            }
            Some(Connection {
                local: parse_endpoint(fields[3])?,
                remote: parse_endpoint(fields[4])?,
            })
        })
        .collect()
}

/// `10.0.0.2:5432`, `2001:db8::1:443` (Linux) or `10.0.0.2.5432` (BSD)
fn parse_endpoint(token: &str) -> Option<SocketAddr> {
    if let Ok(addr) = token.parse::<SocketAddr>() {
        return Some(canonical(addr));
    }

    let split = token.rsplit_once(':').or_else(|| token.rsplit_once('.'))?;
    let ip: IpAddr = split.0.trim_matches(|c| c == '[' || c == ']').parse().ok()?;
    let port: u16 = split.1.parse().ok()?;
    Some(canonical(SocketAddr::new(ip, port)))
}

/// Map `::ffff:a.b.c.d` back to IPv4
fn canonical(addr: SocketAddr) -> SocketAddr {
    match addr.ip() {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => SocketAddr::new(IpAddr::V4(v4), addr.port()),
            None => addr,
        },
        IpAddr::V4(_) => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NETSTAT: &str = "\
Active Internet connections (w/o servers)
Proto Recv-Q Send-Q Local Address           Foreign Address         State
tcp        0      0 10.0.0.2:53422          198.51.100.1:3333       ESTABLISHED
tcp        0      0 10.0.0.2:40110          198.51.100.9:443        TIME_WAIT
tcp6       0      0 ::ffff:10.0.0.2:41000   ::ffff:198.51.100.4:4444 ESTABLISHED
tcp6       0      0 2001:db8::2:50000       2001:db8::7:14444       ESTABLISHED
";

    #[test]
    fn test_parse_established_only() {
        let conns = parse_netstat(NETSTAT);
        assert_eq!(conns.len(), 3);
        assert_eq!(conns[0].remote, "198.51.100.1:3333".parse().unwrap());
    }

    #[test]
    fn test_mapped_ipv6_becomes_ipv4() {
        let conns = parse_netstat(NETSTAT);
        assert_eq!(conns[1].remote, "198.51.100.4:4444".parse().unwrap());
        assert_eq!(conns[2].remote, "[2001:db8::7]:14444".parse().unwrap());
    }

    #[test]
    fn test_bsd_endpoint() {
        assert_eq!(
            parse_endpoint("198.51.100.1.3333"),
            Some("198.51.100.1:3333".parse().unwrap())
        );
        assert_eq!(parse_endpoint("*.*"), None);
    }
}
