use serde::Serialize;
use std::hash::{Hash, Hasher};
use std::net::Ipv4Addr;

pub const DEVICE_TYPE_WILDCARD: u32 = 0xFFFF_FFFF;
pub const DEVICE_TYPE_TUNER: u32 = 0x0000_0001;
pub const DEVICE_ID_WILDCARD: u32 = 0xFFFF_FFFF;

/// Multicast range `224.0.0.0/4`. Never a valid discovery or control target.
pub fn is_multicast(ip: u32) -> bool {
    (0xE000_0000..0xF000_0000).contains(&ip)
}

/// Device ids belonging to legacy firmware that is no longer supported.
pub fn is_obsolete_device(device_id: u32) -> bool {
    match device_id >> 20 {
        0x100 => device_id < 0x1004_0000, // TECH-US / TECH3-US
        0x120 => device_id < 0x1203_0000, // TECH3-EU
        0x101 // HDHR-US
        | 0x102 // HDHR-T1-US
        | 0x103 // HDHR3-US
        | 0x111 // HDHR3-DT
        | 0x121 // HDHR-EU
        | 0x122 => true, // HDHR3-EU
        _ => false,
    }
}

/// Tuner count for firmware that does not report it; 0 when unknown.
pub fn inferred_tuner_count(device_id: u32) -> u8 {
    match device_id >> 20 {
        0x102 => 1,
        0x100 | 0x101 | 0x121 => 2,
        _ => 0,
    }
}

/// A device that answered a discover request.
///
/// Equality covers ip, type and id only.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveredDevice {
    pub ip_address: u32,
    pub device_type: u32,
    pub device_id: u32,
    pub tuner_count: u8,
    pub base_url: Option<String>,
}

impl DiscoveredDevice {
    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip_address)
    }
}

impl PartialEq for DiscoveredDevice {
    fn eq(&self, other: &Self) -> bool {
        self.ip_address == other.ip_address
            && self.device_type == other.device_type
            && self.device_id == other.device_id
    }
}

impl Eq for DiscoveredDevice {}

impl Hash for DiscoveredDevice {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.ip_address.hash(state);
        self.device_type.hash(state);
        self.device_id.hash(state);
    }
}

/// One tuner of a physical device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Device {
    pub ip_address: u32,
    pub device_type: u32,
    pub device_id: u32,
    pub tuner_index: u32,
    pub device_model: Option<String>,
}

impl Device {
    pub fn new(discovered: &DiscoveredDevice, tuner_index: u32, device_model: Option<String>) -> Self {
        Device {
            ip_address: discovered.ip_address,
            device_type: discovered.device_type,
            device_id: discovered.device_id,
            tuner_index,
            device_model,
        }
    }

    pub fn ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.ip_address)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:08X}-{} @ {}", self.device_id, self.tuner_index, self.ip())?;
        if let Some(model) = &self.device_model {
            write!(f, " ({})", model)?;
        }
        Ok(())
    }
}
