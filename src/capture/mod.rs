mod packet;
mod sniffer;

pub use packet::{DecodedPacket, EthernetAddrs, NetworkLayer, TcpFlags, TransportLayer};
pub use sniffer::PacketSniffer;
