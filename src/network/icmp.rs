//! ICMP echo for host liveness checks
//!
//! Prefers a raw ICMPv4 socket, then the unprivileged datagram ICMP socket
//! Linux and macOS offer, then the system `ping` binary. IPv6 always goes
//! through `ping -6`. Every failure is reported as an unsuccessful
//! [`PingResult`]; nothing here returns an error to the caller.

use std::io::Read;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use log::{debug, warn};
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::MutableEchoRequestPacket;
use pnet::packet::icmp::{self, IcmpCode, IcmpPacket, IcmpTypes};
use pnet::packet::ipv4::Ipv4Packet;
use rand::Rng;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::process::Command;

use crate::ScanError;

const ECHO_HEADER_LEN: usize = 8;
const ECHO_PAYLOAD: &[u8] = b"minehound-liveness-probe";

static SOCKET_WARNING: AtomicBool = AtomicBool::new(false);

/// ICMP ping result
#[derive(Debug, Clone)]
pub struct PingResult {
    pub target: IpAddr,
    pub success: bool,
    pub rtt: Option<Duration>,
    pub error: Option<String>,
}

impl PingResult {
    fn reply(target: IpAddr, rtt: Duration) -> Self {
        Self {
            target,
            success: true,
            rtt: Some(rtt),
            error: None,
        }
    }

    fn failed(target: IpAddr, error: impl Into<String>) -> Self {
        Self {
            target,
            success: false,
            rtt: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketKind {
    Raw,
    Datagram,
}

/// One-shot ICMPv4 echo pinger
pub struct IcmpPinger {
    socket: Socket,
    kind: SocketKind,
    identifier: u16,
}

impl IcmpPinger {
    /// Open an ICMP socket, raw if permitted, datagram otherwise
    pub fn new() -> crate::Result<Self> {
        let (socket, kind) = match Socket::new(Domain::IPV4, Type::RAW, Some(Protocol::ICMPV4)) {
            Ok(socket) => (socket, SocketKind::Raw),
            Err(raw_err) => {
                let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::ICMPV4))
                    .map_err(|e| {
                        if raw_err.kind() == std::io::ErrorKind::PermissionDenied
                            || e.kind() == std::io::ErrorKind::PermissionDenied
                        {
                            ScanError::Permission(format!("ICMP socket: {}", e))
                        } else {
                            ScanError::Network(e.to_string())
                        }
                    })?;
                (socket, SocketKind::Datagram)
            }
        };

        Ok(Self {
            socket,
            kind,
            identifier: rand::thread_rng().gen::<u16>(),
        })
    }

    /// Send one echo request and wait up to `timeout` for the reply
    pub async fn ping(self, target: Ipv4Addr, timeout: Duration) -> PingResult {
        let addr = IpAddr::V4(target);
        match tokio::task::spawn_blocking(move || self.ping_blocking(target, timeout)).await {
            Ok(result) => result,
            Err(e) => PingResult::failed(addr, format!("ping task failed: {}", e)),
        }
    }

    fn ping_blocking(&self, target: Ipv4Addr, timeout: Duration) -> PingResult {
        let addr = IpAddr::V4(target);
        let sequence = rand::thread_rng().gen::<u16>();
        let request = build_echo_request(self.identifier, sequence);
        let dest = SockAddr::from(SocketAddr::new(addr, 0));

        // A connected ICMP socket only delivers datagrams from `target`
        if let Err(e) = self.socket.connect(&dest) {
            return PingResult::failed(addr, e.to_string());
        }

        let start = Instant::now();
        if let Err(e) = self.socket.send(&request) {
            return PingResult::failed(addr, e.to_string());
        }

        let deadline = start + timeout;
        let mut buffer = [0u8; 1500];
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return PingResult::failed(addr, "Timeout");
            }
            if let Err(e) = self.socket.set_read_timeout(Some(remaining)) {
                return PingResult::failed(addr, e.to_string());
            }

            match (&self.socket).read(&mut buffer) {
                Ok(len) => {
                    let identifier = match self.kind {
                        // the kernel rewrites the identifier on datagram sockets
                        SocketKind::Datagram => None,
                        SocketKind::Raw => Some(self.identifier),
                    };
                    if is_echo_reply(&buffer[..len], identifier, sequence) {
                        return PingResult::reply(addr, start.elapsed());
                    }
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return PingResult::failed(addr, "Timeout");
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return PingResult::failed(addr, e.to_string()),
            }
        }
    }
}

/// Build an ICMP echo request with a valid checksum
fn build_echo_request(identifier: u16, sequence: u16) -> Vec<u8> {
    let mut buffer = vec![0u8; ECHO_HEADER_LEN + ECHO_PAYLOAD.len()];
    buffer[ECHO_HEADER_LEN..].copy_from_slice(ECHO_PAYLOAD);

    if let Some(mut packet) = MutableEchoRequestPacket::new(&mut buffer) {
        packet.set_icmp_type(IcmpTypes::EchoRequest);
        packet.set_icmp_code(IcmpCode(0));
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        packet.set_checksum(0);
    }

    let checksum = IcmpPacket::new(&buffer).map(|view| icmp::checksum(&view));
    if let Some(checksum) = checksum {
        buffer[2..4].copy_from_slice(&checksum.to_be_bytes());
    }
    buffer
}

/// Does `bytes` hold the echo reply to our request?
///
/// Raw sockets (and datagram sockets on some platforms) hand back the IPv4
/// header too; it is stripped when present.
fn is_echo_reply(bytes: &[u8], identifier: Option<u16>, sequence: u16) -> bool {
    let icmp_bytes = match bytes.first() {
        Some(first) if first >> 4 == 4 => match Ipv4Packet::new(bytes) {
            Some(ip) => {
                let offset = ip.get_header_length() as usize * 4;
                match bytes.get(offset..) {
                    Some(rest) => rest,
                    None => return false,
                }
            }
            None => return false,
        },
        _ => bytes,
    };

    match EchoReplyPacket::new(icmp_bytes) {
        Some(reply) => {
            reply.get_icmp_type() == IcmpTypes::EchoReply
                && reply.get_sequence_number() == sequence
                && identifier.map_or(true, |id| reply.get_identifier() == id)
        }
        None => false,
    }
}

/// Ping a host with whatever mechanism the platform allows
pub async fn ping_host(target: IpAddr, timeout: Duration) -> PingResult {
    match target {
        IpAddr::V4(v4) => match IcmpPinger::new() {
            Ok(pinger) => pinger.ping(v4, timeout).await,
            Err(e) => {
                if !SOCKET_WARNING.swap(true, Ordering::Relaxed) {
                    warn!("ICMP sockets unavailable ({}), falling back to system ping", e);
                }
                system_ping(target, timeout).await
            }
        },
        IpAddr::V6(_) => system_ping(target, timeout).await,
    }
}

/// Ping through the system `ping` binary
pub async fn system_ping(target: IpAddr, timeout: Duration) -> PingResult {
    // -W takes whole seconds on Linux
    let wait_secs = ((timeout.as_millis() + 999) / 1000).max(1).to_string();

    let mut cmd = Command::new("ping");
    if target.is_ipv6() {
        cmd.arg("-6");
    }
    cmd.args(["-c", "1", "-W", &wait_secs])
        .arg(target.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let start = Instant::now();
    match tokio::time::timeout(timeout + Duration::from_secs(1), cmd.status()).await {
        Ok(Ok(status)) if status.success() => PingResult::reply(target, start.elapsed()),
        Ok(Ok(status)) => PingResult::failed(target, format!("ping exited with {}", status)),
        Ok(Err(e)) => {
            debug!("Failed to run ping for {}: {}", target, e);
            PingResult::failed(target, e.to_string())
        }
        Err(_) => PingResult::failed(target, "Timeout"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pnet::packet::icmp::echo_reply::MutableEchoReplyPacket;

    fn reply_bytes(identifier: u16, sequence: u16) -> Vec<u8> {
        let mut buffer = vec![0u8; ECHO_HEADER_LEN + 4];
        let mut packet = MutableEchoReplyPacket::new(&mut buffer).unwrap();
        packet.set_icmp_type(IcmpTypes::EchoReply);
        packet.set_identifier(identifier);
        packet.set_sequence_number(sequence);
        buffer
    }

    #[test]
    fn test_echo_request_checksum() {
        let request = build_echo_request(0x1234, 7);
        let view = IcmpPacket::new(&request).unwrap();
        assert_eq!(view.get_icmp_type(), IcmpTypes::EchoRequest);

        let stored = u16::from_be_bytes([request[2], request[3]]);
        assert_eq!(stored, icmp::checksum(&view));
        assert_ne!(stored, 0);
    }

    #[test]
    fn test_reply_without_ip_header() {
        let reply = reply_bytes(99, 5);
        assert!(is_echo_reply(&reply, None, 5));
        assert!(is_echo_reply(&reply, Some(99), 5));
        assert!(!is_echo_reply(&reply, Some(98), 5));
        assert!(!is_echo_reply(&reply, None, 6));
    }

    #[test]
    fn test_reply_with_ip_header() {
        let mut datagram = vec![0u8; 20];
        datagram[0] = 0x45;
        datagram.extend(reply_bytes(1, 2));
        assert!(is_echo_reply(&datagram, Some(1), 2));
    }

    #[test]
    fn test_request_is_not_a_reply() {
        let request = build_echo_request(3, 4);
        assert!(!is_echo_reply(&request, Some(3), 4));
        assert!(!is_echo_reply(&[], None, 4));
    }
}
