use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use crate::capture::{DecodedPacket, NetworkLayer, TransportLayer};

/// Size of the address buffer; IPv4 addresses occupy the first 4 bytes.
pub const ADDR_SIZE: usize = 16;

/// One side of a conversation.
///
/// Ordering compares the port first, then the address bytes, then the MAC,
/// which is exactly the field declaration order used by the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Service {
    port: u16,
    ip_addr: [u8; ADDR_SIZE],
    mac_addr: [u8; 6],
}

impl Service {
    pub fn new(mac_addr: [u8; 6], ip_addr: [u8; ADDR_SIZE], port: u16) -> Self {
        Self { port, ip_addr, mac_addr }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn ip_addr(&self) -> &[u8; ADDR_SIZE] {
        &self.ip_addr
    }

    pub fn mac_addr(&self) -> &[u8; 6] {
        &self.mac_addr
    }
}

pub fn ipv4_bytes(addr: Ipv4Addr) -> [u8; ADDR_SIZE] {
    let mut buf = [0u8; ADDR_SIZE];
    buf[..4].copy_from_slice(&addr.octets());
    buf
}

pub fn ipv6_bytes(addr: Ipv6Addr) -> [u8; ADDR_SIZE] {
    addr.octets()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportProto {
    Tcp,
    Udp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    pub fn number(self) -> u8 {
        match self {
            IpVersion::V4 => 4,
            IpVersion::V6 => 6,
        }
    }

    /// Renders an address buffer in the textual form of this version.
    pub fn format_addr(self, addr: &[u8; ADDR_SIZE]) -> String {
        match self {
            IpVersion::V4 => Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]).to_string(),
            IpVersion::V6 => Ipv6Addr::from(*addr).to_string(),
        }
    }
}

/// Direction-independent identity of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    l_service: Service,
    r_service: Service,
    vlan_id: u16,
    transport: TransportProto,
}

impl FlowKey {
    /// Orders the two endpoints so that both directions give the same key.
    pub fn new(a: Service, b: Service, vlan_id: u16, transport: TransportProto) -> Self {
        let (l_service, r_service) = if a <= b { (a, b) } else { (b, a) };
        Self { l_service, r_service, vlan_id, transport }
    }

    pub fn l_service(&self) -> &Service {
        &self.l_service
    }

    pub fn r_service(&self) -> &Service {
        &self.r_service
    }

    pub fn vlan_id(&self) -> u16 {
        self.vlan_id
    }

    pub fn transport(&self) -> TransportProto {
        self.transport
    }
}

/// Endpoints of a single packet in the direction it travelled, plus its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServicePair {
    pub src: Service,
    pub dst: Service,
    pub ip_version: IpVersion,
    pub key: FlowKey,
}

impl ServicePair {
    /// Derives the pair from a decoded packet.
    ///
    /// Returns `None` unless the packet has an Ethernet header, exactly one of
    /// IPv4/IPv6 and exactly one of TCP/UDP.
    pub fn from_packet(pkt: &DecodedPacket) -> Option<Self> {
        let eth = pkt.ethernet?;

        let (src_ip, dst_ip, ip_version) = match pkt.network {
            NetworkLayer::Ipv4 { src, dst } => (ipv4_bytes(src), ipv4_bytes(dst), IpVersion::V4),
            NetworkLayer::Ipv6 { src, dst } => (ipv6_bytes(src), ipv6_bytes(dst), IpVersion::V6),
            NetworkLayer::None => return None,
        };

        let (sport, dport, transport) = match pkt.transport {
            TransportLayer::Tcp { sport, dport, .. } => (sport, dport, TransportProto::Tcp),
            TransportLayer::Udp { sport, dport } => (sport, dport, TransportProto::Udp),
            TransportLayer::None => return None,
        };

        let src = Service::new(eth.src, src_ip, sport);
        let dst = Service::new(eth.dst, dst_ip, dport);
        let key = FlowKey::new(src, dst, pkt.vlan_id.unwrap_or(0), transport);

        Some(Self { src, dst, ip_version, key })
    }
}

/// `aa:bb:cc:dd:ee:ff`
pub struct MacDisplay<'a>(pub &'a [u8; 6]);

impl fmt::Display for MacDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}
