use std::net::{Ipv4Addr, Ipv6Addr};

/// TCP control bits of a single segment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlags {
    pub cwr: bool,
    pub ece: bool,
    pub urg: bool,
    pub ack: bool,
    pub psh: bool,
    pub rst: bool,
    pub syn: bool,
    pub fin: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetAddrs {
    pub src: [u8; 6],
    pub dst: [u8; 6],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkLayer {
    None,
    Ipv4 { src: Ipv4Addr, dst: Ipv4Addr },
    Ipv6 { src: Ipv6Addr, dst: Ipv6Addr },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLayer {
    None,
    Tcp { sport: u16, dport: u16, flags: TcpFlags },
    Udp { sport: u16, dport: u16 },
}

/// One packet as handed over by the capture reader.
///
/// Owned and self-contained: it lives for the duration of a single
/// `FlowTable::process` call and nothing in the processor keeps it afterwards.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    /// Capture timestamp in seconds.
    pub timestamp: f64,
    /// Captured bytes. Their length is the packet's byte count.
    pub data: Vec<u8>,
    pub ethernet: Option<EthernetAddrs>,
    pub vlan_id: Option<u16>,
    pub network: NetworkLayer,
    pub transport: TransportLayer,
}

impl DecodedPacket {
    /// A packet with no decoded layers. Still counted, never flow-associated.
    pub fn undecoded(timestamp: f64, data: Vec<u8>) -> Self {
        Self {
            timestamp,
            data,
            ethernet: None,
            vlan_id: None,
            network: NetworkLayer::None,
            transport: TransportLayer::None,
        }
    }

    /// Serialized length of the packet as captured.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn tcp_flags(&self) -> Option<TcpFlags> {
        match self.transport {
            TransportLayer::Tcp { flags, .. } => Some(flags),
            _ => None,
        }
    }
}
