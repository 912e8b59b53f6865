use crate::codec::tlv::value_string;
use crate::codec::{
    open_frame, seal_frame, FrameDecodeResult, FrameType, Tag, TagReader, TagWriter, MAX_FRAME_PAYLOAD, MAX_TAG_LENGTH,
};
use crate::config::TunerConfig;
use crate::discover::{is_multicast, DiscoverySocketPool, DEVICE_ID_WILDCARD, DEVICE_TYPE_WILDCARD};
use crate::error::{Error, Result};
use crate::logging::{LogLevel, TunerLogger};
use crate::transport::InterfaceSource;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, Shutdown, SocketAddrV4, TcpStream};
use std::sync::Arc;
use std::time::{Duration, Instant};

const COMPONENT: &str = "Control";

/// Receive buffer for one control reply.
pub const CONTROL_RECV_BUFFER_SIZE: usize = 3074;

/// Build a getset request payload.
///
/// Each string is announced with a length of `len + 1`. The terminating NUL is
/// only written when `nul_terminator` is set. Strings that do not fit a record,
/// or a payload that does not fit a frame, are rejected.
pub fn getset_request(name: &str, value: Option<&str>, nul_terminator: bool) -> Result<Vec<u8>> {
    let mut writer = TagWriter::new();
    write_string(&mut writer, Tag::GETSET_NAME, "name", name, nul_terminator)?;
    if let Some(value) = value {
        write_string(&mut writer, Tag::GETSET_VALUE, "value", value, nul_terminator)?;
    }

    let length = writer.as_bytes().len();
    if length > MAX_FRAME_PAYLOAD {
        return Err(Error::TooLong { what: "getset request", length, max: MAX_FRAME_PAYLOAD });
    }
    Ok(writer.into_bytes())
}

fn write_string(writer: &mut TagWriter, tag: Tag, what: &'static str, text: &str, nul_terminator: bool) -> Result<()> {
    let length = text.len() + 1;
    if length > MAX_TAG_LENGTH {
        return Err(Error::TooLong { what, length, max: MAX_TAG_LENGTH });
    }

    writer.write_header(tag, length).write_raw(text.as_bytes());
    if nul_terminator {
        writer.write_raw(&[0]);
    }
    Ok(())
}

/// Extract the property value from a getset reply payload.
///
/// `Ok(None)` when the device answered with an error message or without a value.
pub fn parse_getset_reply(payload: &[u8]) -> std::result::Result<Option<String>, String> {
    for (tag, value) in TagReader::new(payload) {
        match tag {
            Tag::GETSET_VALUE => return Ok(Some(value_string(value))),
            Tag::ERROR_MESSAGE => return Err(value_string(value)),
            _ => {}
        }
    }
    Ok(None)
}

/// TCP control connection to one device.
///
/// The connection is opened lazily on the first request, resolving the device
/// through discovery, and closed on [`ControlSocket::close`] or drop.
pub struct ControlSocket {
    desired_device_id: u32,
    desired_device_ip: u32,
    actual_device_id: u32,
    actual_device_ip: u32,
    stream: Option<TcpStream>,

    config: TunerConfig,
    interfaces: Arc<dyn InterfaceSource>,
    logger: Arc<dyn TunerLogger>,
}

impl ControlSocket {
    /// `device_id` may be [`DEVICE_ID_WILDCARD`] and `device_ip` may be 0, but
    /// not both.
    pub fn new(
        device_id: u32,
        device_ip: u32,
        config: &TunerConfig,
        interfaces: Arc<dyn InterfaceSource>,
        logger: Arc<dyn TunerLogger>,
    ) -> Self {
        ControlSocket {
            desired_device_id: device_id,
            desired_device_ip: device_ip,
            actual_device_id: 0,
            actual_device_ip: 0,
            stream: None,
            config: config.clone(),
            interfaces,
            logger,
        }
    }

    pub fn device_id(&self) -> u32 {
        self.actual_device_id
    }

    pub fn device_ip(&self) -> Ipv4Addr {
        Ipv4Addr::from(self.actual_device_ip)
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Resolve the device and open the TCP connection if not already open.
    pub fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let target_ip = Ipv4Addr::from(self.desired_device_ip);
        if self.desired_device_id == DEVICE_ID_WILDCARD && self.desired_device_ip == 0 {
            return Err(Error::DeviceNotFound { device_id: self.desired_device_id, ip: target_ip });
        }
        if is_multicast(self.desired_device_ip) {
            return Err(Error::MulticastTarget(target_ip));
        }

        let mut pool = DiscoverySocketPool::new(&self.config, self.interfaces.clone(), self.logger.clone())?;
        let device = pool
            .find_devices(self.desired_device_ip, DEVICE_TYPE_WILDCARD, self.desired_device_id, 1)
            .into_iter()
            .next()
            .ok_or(Error::DeviceNotFound { device_id: self.desired_device_id, ip: target_ip })?;

        self.actual_device_id = device.device_id;
        self.actual_device_ip = device.ip_address;

        let addr = SocketAddrV4::new(device.ip(), self.config.control_port);
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        socket.connect_timeout(&SockAddr::from(addr), self.config.control_connect_timeout())?;
        socket.set_nodelay(true)?;
        socket.set_write_timeout(Some(self.config.control_io_timeout()))?;

        self.logger.log(
            LogLevel::Debug,
            COMPONENT,
            &format!("Connected to {:08X} at {}", self.actual_device_id, addr),
        );
        self.stream = Some(socket.into());
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Read a property. Any failure, including a device error message, yields `None`.
    pub fn get(&mut self, name: &str) -> Option<String> {
        self.get_set(name, None)
    }

    /// Write a property and return the value the device reports back.
    pub fn set(&mut self, name: &str, value: &str) -> Option<String> {
        self.get_set(name, Some(value))
    }

    fn get_set(&mut self, name: &str, value: Option<&str>) -> Option<String> {
        match self.try_get_set(name, value) {
            Ok(Ok(result)) => result,
            Ok(Err(message)) => {
                self.logger.log(LogLevel::Debug, COMPONENT, &format!("{}: device error: {}", name, message));
                None
            }
            Err(e) => {
                self.logger.log(LogLevel::Debug, COMPONENT, &format!("{}: {}", name, e));
                None
            }
        }
    }

    /// Like [`ControlSocket::get`], but reports transport failures. The inner
    /// `Err` carries the device's error message.
    pub fn try_get(&mut self, name: &str) -> Result<std::result::Result<Option<String>, String>> {
        self.try_get_set(name, None)
    }

    fn try_get_set(&mut self, name: &str, value: Option<&str>) -> Result<std::result::Result<Option<String>, String>> {
        let payload = getset_request(name, value, self.config.getset_nul_terminator)?;
        let reply = self.send_recv(FrameType::GETSET_REQUEST, &payload)?;
        Ok(parse_getset_reply(&reply))
    }

    fn send_recv(&mut self, frame_type: FrameType, payload: &[u8]) -> Result<Vec<u8>> {
        let request = seal_frame(payload, frame_type);
        let mut last_error = Error::NotConnected;

        for attempt in 0..self.config.control_attempts.max(1) {
            match self.send_recv_once(&request, frame_type.reply()) {
                Ok(reply) => return Ok(reply),
                // Discovery already ran its own attempts
                Err(e @ (Error::MulticastTarget(_) | Error::DeviceNotFound { .. })) => return Err(e),
                Err(e) => {
                    self.logger.log(
                        LogLevel::Debug,
                        COMPONENT,
                        &format!("Request attempt {} failed: {}", attempt + 1, e),
                    );
                    self.close();
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    fn send_recv_once(&mut self, request: &[u8], expected: FrameType) -> Result<Vec<u8>> {
        self.connect()?;
        let timeout = self.config.control_io_timeout();
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        stream.write_all(request)?;
        recv_frame(stream, expected, timeout)
    }
}

impl Drop for ControlSocket {
    fn drop(&mut self) {
        self.close();
    }
}

/// Accumulate bytes until one complete frame of type `expected` arrives.
fn recv_frame(stream: &mut TcpStream, expected: FrameType, timeout: Duration) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut buffer = [0u8; CONTROL_RECV_BUFFER_SIZE];
    let mut filled = 0;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout("waiting for control reply"));
        }
        if filled == buffer.len() {
            return Err(Error::InvalidFrame);
        }

        stream.set_read_timeout(Some(remaining))?;
        let count = match stream.read(&mut buffer[filled..]) {
            Ok(0) => return Err(std::io::Error::from(ErrorKind::UnexpectedEof).into()),
            Ok(count) => count,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                return Err(Error::Timeout("waiting for control reply"));
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        filled += count;

        match open_frame(&buffer, filled) {
            FrameDecodeResult::Incomplete => continue,
            FrameDecodeResult::Invalid => return Err(Error::InvalidFrame),
            FrameDecodeResult::Frame(frame_type, payload) => {
                if frame_type != expected {
                    return Err(Error::UnexpectedReply { expected: expected.0, actual: frame_type.0 });
                }
                return Ok(payload.to_vec());
            }
        }
    }
}
