use std::io;
use std::net::Ipv4Addr;

/// An IPv4 address assigned to a local interface, with its subnet mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalInterface {
    pub ip: u32,
    pub subnet_mask: u32,
}

impl LocalInterface {
    pub fn new(ip: Ipv4Addr, subnet_mask: Ipv4Addr) -> Self {
        LocalInterface {
            ip: u32::from(ip),
            subnet_mask: u32::from(subnet_mask),
        }
    }

    /// Subnet-directed broadcast address.
    pub fn broadcast(&self) -> u32 {
        self.ip | !self.subnet_mask
    }

    pub fn contains(&self, target_ip: u32) -> bool {
        (target_ip & self.subnet_mask) == (self.ip & self.subnet_mask)
    }
}

/// Source of the local interfaces discovery should send from.
pub trait InterfaceSource: Send + Sync {
    fn local_interfaces(&self) -> io::Result<Vec<LocalInterface>>;
}

/// Enumerates the host's IPv4 interfaces, skipping loopback, link-local and
/// multicast addresses.
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn local_interfaces(&self) -> io::Result<Vec<LocalInterface>> {
        let mut result = Vec::new();
        for iface in if_addrs::get_if_addrs()? {
            if let if_addrs::IfAddr::V4(v4) = iface.addr {
                if v4.ip.is_unspecified() || v4.ip.is_loopback() || v4.ip.is_link_local() || v4.ip.is_multicast() {
                    continue;
                }
                let entry = LocalInterface::new(v4.ip, v4.netmask);
                if !result.contains(&entry) {
                    result.push(entry);
                }
            }
        }
        Ok(result)
    }
}

/// A fixed interface list, for hosts where enumeration is handled elsewhere
/// and for loopback testing.
#[derive(Debug, Clone, Default)]
pub struct StaticInterfaces(pub Vec<LocalInterface>);

impl InterfaceSource for StaticInterfaces {
    fn local_interfaces(&self) -> io::Result<Vec<LocalInterface>> {
        Ok(self.0.clone())
    }
}
