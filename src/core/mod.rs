//! Core seams shared by the probing components

pub mod connector;

pub use connector::{connect_timeout, Connector, TcpConnector};
