//! # Discovery Module
//!
//! Locates HDHomeRun devices with UDP discover requests sent from every
//! local subnet, plus a routable fallback socket.
//!
//! ## Key Types
//!
//! - [`DiscoverySocketPool`] - per-interface sockets and the `find_devices` round
//! - [`DiscoveredDevice`] - one reply, identified by (ip, type, id)
//! - [`Device`] - one tuner of a physical device, handed out by the manager

pub mod device;
pub mod pool;

pub use device::*;
pub use pool::*;
