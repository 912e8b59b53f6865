//! Loopback stand-ins for HDHomeRun devices.
#![allow(dead_code)]

use hdhomerun_tuner::codec::tlv::value_string;
use hdhomerun_tuner::logging::NullLogger;
use hdhomerun_tuner::{
    open_frame, seal_frame, FrameDecodeResult, FrameType, LocalInterface, StaticInterfaces, Tag, TagWriter,
    TunerConfig, DEVICE_ID_WILDCARD,
};
use std::io::{ErrorKind, Read, Write};
use std::net::{Ipv4Addr, TcpListener, TcpStream, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MockDevice {
    pub device_type: u32,
    pub device_id: u32,
    pub tuner_count: Option<u8>,
    pub base_url: Option<String>,
}

impl MockDevice {
    pub fn tuner(device_id: u32, tuner_count: Option<u8>) -> Self {
        MockDevice { device_type: 1, device_id, tuner_count, base_url: None }
    }

    pub fn reply_frame(&self) -> Vec<u8> {
        let mut writer = TagWriter::new();
        writer.write_u32(Tag::DEVICE_TYPE, self.device_type).write_u32(Tag::DEVICE_ID, self.device_id);
        if let Some(count) = self.tuner_count {
            writer.write_u8(Tag::TUNER_COUNT, count);
        }
        if let Some(url) = &self.base_url {
            writer.write_bytes(Tag::BASE_URL, url.as_bytes());
        }
        seal_frame(writer.as_bytes(), FrameType::DISCOVER_REPLY)
    }
}

/// Answers discover requests with every configured device, regardless of the
/// requested type or id, so client-side filtering is exercised.
pub struct MockDiscoverPeer {
    pub port: u16,
    pub requests: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockDiscoverPeer {
    pub fn start(devices: Vec<MockDevice>) -> Self {
        Self::start_with_noise(devices, Vec::new())
    }

    /// `noise` datagrams are sent ahead of the replies.
    pub fn start_with_noise(devices: Vec<MockDevice>, noise: Vec<Vec<u8>>) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.set_read_timeout(Some(Duration::from_millis(20))).unwrap();
        let port = socket.local_addr().unwrap().port();

        let running = Arc::new(AtomicBool::new(true));
        let requests = Arc::new(AtomicUsize::new(0));
        let r = running.clone();
        let count = requests.clone();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 1500];
            while r.load(Ordering::SeqCst) {
                let (len, src) = match socket.recv_from(&mut buf) {
                    Ok(received) => received,
                    Err(_) => continue,
                };
                if let FrameDecodeResult::Frame(FrameType::DISCOVER_REQUEST, _) = open_frame(&buf, len) {
                    count.fetch_add(1, Ordering::SeqCst);
                    for datagram in &noise {
                        let _ = socket.send_to(datagram, src);
                    }
                    for device in &devices {
                        let _ = socket.send_to(&device.reply_frame(), src);
                    }
                }
            }
        });

        MockDiscoverPeer { port, requests, running, handle: Some(handle) }
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Drop for MockDiscoverPeer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[derive(Debug, Clone)]
pub enum ControlReply {
    Value(String),
    /// Answer with the value the request carried.
    Echo,
    Error(String),
    WrongType,
}

/// Answers getset requests on loopback TCP.
pub struct MockControlPeer {
    pub port: u16,
    pub names: Arc<Mutex<Vec<String>>>,
    pub values: Arc<Mutex<Vec<Option<String>>>>,
    pub connections: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl MockControlPeer {
    pub fn start(reply: ControlReply) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let port = listener.local_addr().unwrap().port();

        let running = Arc::new(AtomicBool::new(true));
        let names = Arc::new(Mutex::new(Vec::new()));
        let values = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicUsize::new(0));
        let (r, n, v, c) = (running.clone(), names.clone(), values.clone(), connections.clone());

        let handle = thread::spawn(move || {
            while r.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        c.fetch_add(1, Ordering::SeqCst);
                        serve_connection(stream, &reply, &n, &v, &r);
                    }
                    Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(Duration::from_millis(5)),
                    Err(_) => break,
                }
            }
        });

        MockControlPeer { port, names, values, connections, running, handle: Some(handle) }
    }

    pub fn requested_names(&self) -> Vec<String> {
        self.names.lock().unwrap().clone()
    }

    pub fn requested_values(&self) -> Vec<Option<String>> {
        self.values.lock().unwrap().clone()
    }
}

impl Drop for MockControlPeer {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve_connection(
    mut stream: TcpStream,
    reply: &ControlReply,
    names: &Mutex<Vec<String>>,
    values: &Mutex<Vec<Option<String>>>,
    running: &AtomicBool,
) {
    stream.set_nonblocking(false).unwrap();
    stream.set_read_timeout(Some(Duration::from_millis(50))).unwrap();

    let mut buf = [0u8; 3074];
    let mut filled = 0;
    while running.load(Ordering::SeqCst) && filled < buf.len() {
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return,
            Ok(count) => filled += count,
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => continue,
            Err(_) => return,
        }

        let payload = match open_frame(&buf, filled) {
            FrameDecodeResult::Incomplete => continue,
            FrameDecodeResult::Invalid => return,
            FrameDecodeResult::Frame(_, payload) => payload.to_vec(),
        };
        filled = 0;

        let (name, value) = request_fields(&payload);
        names.lock().unwrap().push(name.clone());
        values.lock().unwrap().push(value.clone());

        let mut writer = TagWriter::new();
        writer.write_bytes(Tag::GETSET_NAME, format!("{}\0", name).as_bytes());
        let frame_type = match reply {
            ControlReply::Value(value) => {
                writer.write_bytes(Tag::GETSET_VALUE, format!("{}\0", value).as_bytes());
                FrameType::GETSET_REPLY
            }
            ControlReply::Echo => {
                let echoed = value.unwrap_or_default();
                writer.write_bytes(Tag::GETSET_VALUE, format!("{}\0", echoed).as_bytes());
                FrameType::GETSET_REPLY
            }
            ControlReply::Error(message) => {
                writer.write_bytes(Tag::ERROR_MESSAGE, format!("{}\0", message).as_bytes());
                FrameType::GETSET_REPLY
            }
            ControlReply::WrongType => FrameType::DISCOVER_REPLY,
        };
        if stream.write_all(&seal_frame(writer.as_bytes(), frame_type)).is_err() {
            return;
        }
    }
}

/// Name and value of a getset request.
///
/// Records may announce one byte more than they carry (no NUL written), so the
/// length is only trusted when the announced last byte is a NUL.
fn request_fields(payload: &[u8]) -> (String, Option<String>) {
    let mut name = String::new();
    let mut value = None;
    let mut position = 0;

    while position + 2 <= payload.len() {
        let tag = payload[position];
        let mut length = payload[position + 1] as usize;
        position += 2;
        if length & 0x80 != 0 {
            let Some(&second) = payload.get(position) else { break };
            length = ((second as usize) << 7) | (length & 0x7F);
            position += 1;
        }

        let announced_end = position + length;
        let end = if length == 0 || payload.get(announced_end - 1) == Some(&0) {
            announced_end
        } else {
            announced_end.saturating_sub(1).min(payload.len())
        };
        let text = value_string(&payload[position..end]);
        position = end;

        if tag == Tag::GETSET_NAME.0 {
            name = text;
        } else if tag == Tag::GETSET_VALUE.0 {
            value = Some(text);
        }
    }

    (name, value)
}

pub fn loopback_interfaces() -> Arc<StaticInterfaces> {
    Arc::new(StaticInterfaces(vec![LocalInterface::new(Ipv4Addr::LOCALHOST, Ipv4Addr::BROADCAST)]))
}

pub fn null_logger() -> Arc<NullLogger> {
    Arc::new(NullLogger)
}

pub fn loopback_config(discover_port: u16, control_port: u16) -> TunerConfig {
    TunerConfig {
        discover_port,
        control_port,
        discover_wait_per_socket_ms: 200,
        control_connect_timeout_ms: 500,
        control_io_timeout_ms: 500,
        ..TunerConfig::default()
    }
}

pub const LOOPBACK: u32 = 0x7F00_0001;
pub const WILDCARD: u32 = DEVICE_ID_WILDCARD;
