//! Host-level network primitives: ICMP echo, neighbour table, reverse DNS
//! and the local connection table

pub mod connections;
pub mod dns;
pub mod icmp;
pub mod neighbor;

pub use connections::Connection;
pub use icmp::{ping_host, PingResult};
