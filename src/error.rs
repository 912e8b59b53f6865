//! Error types for discovery, control and persistence.

use std::net::Ipv4Addr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Multicast addresses are never valid discovery or control targets.
    #[error("Multicast address {0} is not a valid target")]
    MulticastTarget(Ipv4Addr),

    #[error("Device {device_id:08X} not found (ip {ip})")]
    DeviceNotFound { device_id: u32, ip: Ipv4Addr },

    #[error("No discover request could be sent")]
    NothingSent,

    #[error("Timed out while {0}")]
    Timeout(&'static str),

    #[error("Unexpected reply type: expected 0x{expected:04X}, got 0x{actual:04X}")]
    UnexpectedReply { expected: u16, actual: u16 },

    #[error("{what} of {length} bytes exceeds the {max}-byte limit")]
    TooLong { what: &'static str, length: usize, max: usize },

    #[error("Frame failed CRC validation")]
    InvalidFrame,

    #[error("Control socket is not connected")]
    NotConnected,
}

pub type Result<T> = std::result::Result<T, Error>;
