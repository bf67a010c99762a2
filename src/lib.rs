#![doc = include_str!("../README.md")]

pub mod broadcast;
pub mod cli;
pub mod core;
pub mod dispatch;
pub mod location;
pub mod protocol;
pub mod registry;
pub mod satellite;
pub mod server;
pub mod svid;

/// Request ingress port, loopback only.
pub const HTTP_PORT: u16 = 9767;

/// Broadcast ingress port, one receiver per consuming process.
pub const BROADCAST_PORT: u16 = 9768;

/// Local broadcast address update datagrams are emitted on.
pub const BROADCAST_ADDR: &str = "127.255.255.255";

/// Upper bound on message size, both channels.
pub const MAX_BODY: usize = 10240;

pub use crate::core::Core;
