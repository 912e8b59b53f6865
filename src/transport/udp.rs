use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{ErrorKind, Result};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

/// A UDP socket used for discovery, bound to one local address.
///
/// The routable socket is bound to the wildcard address and has a zero
/// `local_ip`/`subnet_mask`.
pub struct DiscoverySocket {
    socket: UdpSocket,
    pub local_ip: u32,
    pub subnet_mask: u32,
    /// Still present after the latest interface enumeration.
    pub detected: bool,
    /// A request went out on this socket during the current round.
    pub discover_packet_sent: bool,
}

impl DiscoverySocket {
    pub fn bind(local_ip: u32, subnet_mask: u32, recv_timeout: Duration) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_broadcast(true)?;

        let bind_addr = SocketAddrV4::new(Ipv4Addr::from(local_ip), 0);
        socket.bind(&SockAddr::from(bind_addr))?;
        socket.set_read_timeout(Some(recv_timeout))?;

        Ok(DiscoverySocket {
            socket: socket.into(),
            local_ip,
            subnet_mask,
            detected: true,
            discover_packet_sent: false,
        })
    }

    /// Socket bound to `0.0.0.0`, letting the OS pick the route.
    pub fn routable(recv_timeout: Duration) -> Result<Self> {
        Self::bind(0, 0, recv_timeout)
    }

    pub fn send_to(&self, data: &[u8], target_ip: u32, port: u16) -> Result<usize> {
        let dest = SocketAddrV4::new(Ipv4Addr::from(target_ip), port);
        self.socket.send_to(data, dest)
    }

    /// Receive one datagram. `Ok(None)` when the read timeout elapsed.
    pub fn receive(&self, buffer: &mut [u8]) -> Result<Option<(usize, Ipv4Addr)>> {
        match self.socket.recv_from(buffer) {
            Ok((len, SocketAddr::V4(addr))) => Ok(Some((len, *addr.ip()))),
            Ok((_, SocketAddr::V6(_))) => Ok(None),
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Whether `target_ip` is on this socket's subnet. The routable socket
    /// matches nothing.
    pub fn subnet_contains(&self, target_ip: u32) -> bool {
        self.subnet_mask != 0 && (target_ip & self.subnet_mask) == (self.local_ip & self.subnet_mask)
    }
}
