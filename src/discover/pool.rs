use super::device::*;
use crate::codec::tlv::{value_string, value_u32, value_u8};
use crate::codec::{open_frame, seal_frame, FrameDecodeResult, FrameType, Tag, TagReader, TagWriter};
use crate::config::TunerConfig;
use crate::error::{Error, Result};
use crate::logging::{LogLevel, TunerLogger};
use crate::transport::{DiscoverySocket, InterfaceSource};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const COMPONENT: &str = "Discover";

/// Largest datagram a discover reply is read into.
const RECV_BUFFER_SIZE: usize = 3074;

/// Build the payload of a discover request.
pub fn discover_request(device_type: u32, device_id: u32) -> Vec<u8> {
    let mut writer = TagWriter::new();
    writer.write_u32(Tag::DEVICE_TYPE, device_type).write_u32(Tag::DEVICE_ID, device_id);
    seal_frame(writer.as_bytes(), FrameType::DISCOVER_REQUEST)
}

/// Decode a discover reply received from `remote_ip`.
///
/// Returns `None` for incomplete frames, CRC failures and any frame type other
/// than a discover reply.
pub fn parse_discover_reply(buffer: &[u8], remote_ip: Ipv4Addr) -> Option<DiscoveredDevice> {
    let payload = match open_frame(buffer, buffer.len()) {
        FrameDecodeResult::Frame(FrameType::DISCOVER_REPLY, payload) => payload,
        _ => return None,
    };

    let mut device = DiscoveredDevice {
        ip_address: u32::from(remote_ip),
        device_type: 0,
        device_id: 0,
        tuner_count: 0,
        base_url: None,
    };

    for (tag, value) in TagReader::new(payload) {
        match tag {
            Tag::DEVICE_TYPE => {
                if let Some(device_type) = value_u32(value) {
                    device.device_type = device_type;
                }
            }
            Tag::DEVICE_ID => {
                if let Some(device_id) = value_u32(value) {
                    device.device_id = device_id;
                }
            }
            Tag::TUNER_COUNT => {
                if let Some(count) = value_u8(value) {
                    device.tuner_count = count;
                }
            }
            Tag::BASE_URL => device.base_url = Some(value_string(value)),
            _ => {}
        }
    }

    // Old firmware leaves the tuner count out
    if device.tuner_count == 0 {
        device.tuner_count = inferred_tuner_count(device.device_id);
    }

    Some(device)
}

/// One routable socket plus one socket per local subnet.
///
/// A pool is owned by a single caller for the duration of `find_devices`.
/// Interface sockets are kept between calls as long as their interface is
/// still present.
pub struct DiscoverySocketPool {
    routable: DiscoverySocket,
    sockets: BTreeMap<(u32, u32), DiscoverySocket>,
    interfaces: Arc<dyn InterfaceSource>,
    logger: Arc<dyn TunerLogger>,
    running: Option<Arc<AtomicBool>>,

    port: u16,
    attempts: u32,
    wait_per_socket: Duration,
    recv_poll: Duration,
    max_sockets: usize,
}

impl DiscoverySocketPool {
    pub fn new(config: &TunerConfig, interfaces: Arc<dyn InterfaceSource>, logger: Arc<dyn TunerLogger>) -> Result<Self> {
        let routable = DiscoverySocket::routable(config.recv_poll())?;
        Ok(DiscoverySocketPool {
            routable,
            sockets: BTreeMap::new(),
            interfaces,
            logger,
            running: None,
            port: config.discover_port,
            attempts: config.discover_attempts.max(1),
            wait_per_socket: config.discover_wait_per_socket(),
            recv_poll: config.recv_poll(),
            max_sockets: config.max_sockets.max(1),
        })
    }

    /// Stop receive polling as soon as `running` is cleared.
    pub fn with_cancel_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    fn cancelled(&self) -> bool {
        self.running.as_ref().is_some_and(|r| !r.load(Ordering::SeqCst))
    }

    /// Number of sockets, including the routable one.
    pub fn socket_count(&self) -> usize {
        self.sockets.len() + 1
    }

    /// Re-enumerate local interfaces: keep sockets whose interface is still
    /// present, open sockets for new ones, close the rest.
    pub fn refresh_sockets(&mut self) {
        let found = match self.interfaces.local_interfaces() {
            Ok(found) => found,
            Err(e) => {
                self.logger.log(LogLevel::Warn, COMPONENT, &format!("Interface enumeration failed: {}", e));
                Vec::new()
            }
        };

        for socket in self.sockets.values_mut() {
            socket.detected = false;
        }

        for iface in found {
            let key = (iface.ip, iface.subnet_mask);
            if let Some(socket) = self.sockets.get_mut(&key) {
                socket.detected = true;
                continue;
            }
            if self.socket_count() >= self.max_sockets {
                self.logger.log(
                    LogLevel::Debug,
                    COMPONENT,
                    &format!("Socket limit reached, skipping {}", Ipv4Addr::from(iface.ip)),
                );
                continue;
            }
            match DiscoverySocket::bind(iface.ip, iface.subnet_mask, self.recv_poll) {
                Ok(socket) => {
                    self.sockets.insert(key, socket);
                }
                Err(e) => self.logger.log(
                    LogLevel::Debug,
                    COMPONENT,
                    &format!("Failed to bind {}: {}", Ipv4Addr::from(iface.ip), e),
                ),
            }
        }

        self.sockets.retain(|_, socket| socket.detected);
    }

    /// Find up to `max_count` devices. `target_ip == 0` broadcasts; any other
    /// value is sent to that address only. Never fails: errors degrade to an
    /// empty result.
    pub fn find_devices(&mut self, target_ip: u32, device_type: u32, device_id: u32, max_count: usize) -> Vec<DiscoveredDevice> {
        if is_multicast(target_ip) {
            self.logger.log(
                LogLevel::Debug,
                COMPONENT,
                &format!("Refusing multicast target {}", Ipv4Addr::from(target_ip)),
            );
            return Vec::new();
        }

        self.refresh_sockets();

        let mut result = Vec::new();
        for attempt in 0..self.attempts {
            if self.cancelled() {
                break;
            }
            if let Err(e) = self.send(target_ip, device_type, device_id) {
                self.logger.log(LogLevel::Debug, COMPONENT, &format!("Discover send failed (attempt {}): {}", attempt + 1, e));
                continue;
            }
            self.receive(&mut result, device_type, device_id, max_count);
            if !result.is_empty() {
                break;
            }
        }

        self.logger.log(
            LogLevel::Debug,
            COMPONENT,
            &format!("Found {} device(s) for target {}", result.len(), Ipv4Addr::from(target_ip)),
        );
        result
    }

    fn send(&mut self, target_ip: u32, device_type: u32, device_id: u32) -> Result<()> {
        self.routable.discover_packet_sent = false;
        for socket in self.sockets.values_mut() {
            socket.discover_packet_sent = false;
        }

        let packet = discover_request(device_type, device_id);
        if target_ip == 0 {
            self.send_wildcard(&packet)
        } else {
            self.send_target(&packet, target_ip)
        }
    }

    fn send_wildcard(&mut self, packet: &[u8]) -> Result<()> {
        let port = self.port;
        let mut sent = false;

        for socket in self.sockets.values_mut() {
            let broadcast = socket.local_ip | !socket.subnet_mask;
            match socket.send_to(packet, broadcast, port) {
                Ok(_) => {
                    socket.discover_packet_sent = true;
                    sent = true;
                }
                Err(e) => self.logger.log(
                    LogLevel::Debug,
                    COMPONENT,
                    &format!("Broadcast to {} failed: {}", Ipv4Addr::from(broadcast), e),
                ),
            }
        }

        // No usable interfaces: fall back to the global broadcast
        if self.sockets.is_empty() {
            self.routable.send_to(packet, u32::from(Ipv4Addr::BROADCAST), port)?;
            self.routable.discover_packet_sent = true;
            sent = true;
        }

        if sent { Ok(()) } else { Err(Error::NothingSent) }
    }

    fn send_target(&mut self, packet: &[u8], target_ip: u32) -> Result<()> {
        let port = self.port;
        let mut sent = false;

        for socket in self.sockets.values_mut() {
            if !socket.subnet_contains(target_ip) {
                continue;
            }
            match socket.send_to(packet, target_ip, port) {
                Ok(_) => {
                    socket.discover_packet_sent = true;
                    sent = true;
                }
                Err(e) => self.logger.log(LogLevel::Debug, COMPONENT, &format!("Unicast send failed: {}", e)),
            }
        }

        if !sent {
            self.routable.send_to(packet, target_ip, port)?;
            self.routable.discover_packet_sent = true;
        }
        Ok(())
    }

    fn receive(&self, result: &mut Vec<DiscoveredDevice>, device_type: u32, device_id: u32, max_count: usize) {
        let active: Vec<&DiscoverySocket> = std::iter::once(&self.routable)
            .chain(self.sockets.values())
            .filter(|socket| socket.discover_packet_sent)
            .collect();

        let deadline = Instant::now() + self.wait_per_socket * active.len() as u32;
        let mut buffer = [0u8; RECV_BUFFER_SIZE];

        while Instant::now() < deadline && !self.cancelled() {
            for socket in &active {
                let (len, remote_ip) = match socket.receive(&mut buffer) {
                    Ok(Some(received)) => received,
                    Ok(None) => continue,
                    Err(e) => {
                        self.logger.log(LogLevel::Debug, COMPONENT, &format!("Receive failed: {}", e));
                        continue;
                    }
                };

                let Some(device) = parse_discover_reply(&buffer[..len], remote_ip) else {
                    continue;
                };
                if self.accept(result, &device, device_type, device_id) {
                    self.logger.log(
                        LogLevel::Debug,
                        COMPONENT,
                        &format!("Device {:08X} at {} ({} tuners)", device.device_id, device.ip(), device.tuner_count),
                    );
                    result.push(device);
                }
                if result.len() >= max_count {
                    return;
                }
            }
        }
    }

    fn accept(&self, result: &[DiscoveredDevice], device: &DiscoveredDevice, device_type: u32, device_id: u32) -> bool {
        if is_multicast(device.ip_address) {
            return false;
        }
        if device_type != DEVICE_TYPE_WILDCARD && device.device_type != device_type {
            return false;
        }
        if device_id != DEVICE_ID_WILDCARD && device.device_id != device_id {
            return false;
        }
        if is_obsolete_device(device.device_id) {
            self.logger.log(
                LogLevel::Info,
                COMPONENT,
                &format!("Ignoring obsolete device {:08X}", device.device_id),
            );
            return false;
        }
        !result.contains(device)
    }
}
