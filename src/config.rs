use crate::error::Result;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tuner discovery and control configuration.
/// All timing values are in milliseconds unless otherwise specified
#[derive(Debug, Deserialize, Clone)]
pub struct TunerConfig {
    /// UDP port discovery requests are sent to (default: 65001)
    #[serde(default = "default_port")]
    pub discover_port: u16,
    /// TCP port of the control service (default: 65001)
    #[serde(default = "default_port")]
    pub control_port: u16,
    /// Send/receive rounds per discovery call (default: 2)
    #[serde(default = "default_attempts")]
    pub discover_attempts: u32,
    /// Reply window per socket that sent a request (ms, default: 500)
    #[serde(default = "default_discover_wait_per_socket")]
    pub discover_wait_per_socket_ms: u64,
    /// Receive timeout of a single socket poll (ms, default: 10)
    #[serde(default = "default_recv_poll")]
    pub recv_poll_ms: u64,
    /// Upper bound on discovery sockets (default: 16)
    #[serde(default = "default_max_sockets")]
    pub max_sockets: usize,
    /// Control connection timeout (ms, default: 2500)
    #[serde(default = "default_control_timeout")]
    pub control_connect_timeout_ms: u64,
    /// Control send and receive timeout (ms, default: 2500)
    #[serde(default = "default_control_timeout")]
    pub control_io_timeout_ms: u64,
    /// Request/reply attempts per control operation (default: 2)
    #[serde(default = "default_attempts")]
    pub control_attempts: u32,
    /// Most physical devices picked up by a wildcard scan (default: 16)
    #[serde(default = "default_max_devices")]
    pub max_devices: usize,
    /// Model queries per discovered device (default: 2)
    #[serde(default = "default_attempts")]
    pub model_fetch_attempts: u32,
    /// Write a NUL after getset names and values instead of only counting it
    /// in the length prefix (default: false)
    #[serde(default)]
    pub getset_nul_terminator: bool,
    /// Where the last-scanned device id is persisted; in memory when absent
    #[serde(default)]
    pub store_path: Option<PathBuf>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        TunerConfig {
            discover_port: default_port(),
            control_port: default_port(),
            discover_attempts: default_attempts(),
            discover_wait_per_socket_ms: default_discover_wait_per_socket(),
            recv_poll_ms: default_recv_poll(),
            max_sockets: default_max_sockets(),
            control_connect_timeout_ms: default_control_timeout(),
            control_io_timeout_ms: default_control_timeout(),
            control_attempts: default_attempts(),
            max_devices: default_max_devices(),
            model_fetch_attempts: default_attempts(),
            getset_nul_terminator: false,
            store_path: None,
        }
    }
}

fn default_port() -> u16 { 65001 }
fn default_attempts() -> u32 { 2 }
fn default_discover_wait_per_socket() -> u64 { 500 }
fn default_recv_poll() -> u64 { 10 }
fn default_max_sockets() -> usize { 16 }
fn default_control_timeout() -> u64 { 2500 }
fn default_max_devices() -> usize { 16 }

impl TunerConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    pub fn discover_wait_per_socket(&self) -> Duration {
        Duration::from_millis(self.discover_wait_per_socket_ms)
    }

    pub fn recv_poll(&self) -> Duration {
        // A zero read timeout means "block forever" to the OS
        Duration::from_millis(self.recv_poll_ms.max(1))
    }

    pub fn control_connect_timeout(&self) -> Duration {
        Duration::from_millis(self.control_connect_timeout_ms.max(1))
    }

    pub fn control_io_timeout(&self) -> Duration {
        Duration::from_millis(self.control_io_timeout_ms.max(1))
    }
}
