use crossbeam_channel::Sender;
use etherparse::{LinkExtHeader, LinkHeader, NetHeaders, PacketHeaders, TransportHeader};
use log::{debug, info, warn};
use pcap::{Capture, Linktype, Offline, PacketHeader};
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::{atomic::{AtomicBool, Ordering}, Arc};
use std::thread::{self, JoinHandle};

use super::packet::{DecodedPacket, EthernetAddrs, NetworkLayer, TcpFlags, TransportLayer};
use crate::error::MeterError;

/// Reads a capture file on its own thread and forwards every packet, decoded,
/// in file order.
pub struct PacketSniffer {
    sniffer_running: Arc<AtomicBool>,
    sniffer_thread: Option<JoinHandle<u64>>,
    capture: Option<Capture<Offline>>, // owned until start, then moved into thread
    ethernet_link: bool,
    // moved into the thread so the channel closes with it
    packet_sender: Option<Sender<DecodedPacket>>,
}

impl PacketSniffer {
    pub fn new_with_sender(sender: Sender<DecodedPacket>) -> Self {
        Self {
            sniffer_running: Arc::new(AtomicBool::new(false)),
            sniffer_thread: None,
            capture: None,
            ethernet_link: true,
            packet_sender: Some(sender),
        }
    }

    /// Opens the capture file. Any failure here is fatal for the run.
    pub fn init_sniffer(&mut self, path: &Path) -> Result<(), MeterError> {
        let cap = Capture::from_file(path)?;

        let linktype = cap.get_datalink();
        self.ethernet_link = linktype == Linktype::ETHERNET;
        if !self.ethernet_link {
            warn!(
                "Link type {:?} is not Ethernet; packets of {} will not be associated with flows",
                linktype,
                path.display()
            );
        }

        info!("Capture {} successfully opened", path.display());
        self.capture = Some(cap);
        Ok(())
    }

    pub fn start_sniffer(&mut self) -> Result<(), MeterError> {
        let mut cap = self.capture.take().ok_or(MeterError::CaptureNotInitialized)?;

        if self.sniffer_running.swap(true, Ordering::Relaxed) {
            return Err(MeterError::CaptureAlreadyRunning);
        }

        let running = self.sniffer_running.clone();
        let sender = self.packet_sender.take().ok_or(MeterError::CaptureAlreadyRunning)?;
        let ethernet_link = self.ethernet_link;

        self.sniffer_thread = Some(thread::spawn(move || {
            debug!("Sniffer thread started");
            let mut read: u64 = 0;
            while running.load(Ordering::Relaxed) {
                match cap.next_packet() {
                    Ok(packet) => {
                        read += 1;
                        let decoded = if ethernet_link {
                            PacketSniffer::decode_packet(packet.header, packet.data)
                        } else {
                            let ts = packet_timestamp(packet.header);
                            DecodedPacket::undecoded(ts, packet.data.to_vec())
                        };
                        // Receiver gone means the meter stopped consuming.
                        if sender.send(decoded).is_err() {
                            break;
                        }
                    }
                    Err(pcap::Error::NoMorePackets) => break,
                    Err(e) => {
                        warn!("Capture truncated after {read} packets: {e}");
                        break;
                    }
                }
            }
            running.store(false, Ordering::Relaxed);
            debug!("Sniffer thread exiting");
            // cap and sender drop here, closing the channel
            read
        }));

        Ok(())
    }

    /// Waits for the reader thread and returns how many packets it read.
    pub fn stop_sniffer(&mut self) -> Result<u64, MeterError> {
        self.sniffer_running.store(false, Ordering::Relaxed);

        let read = match self.sniffer_thread.take() {
            Some(handle) => handle.join().map_err(|_| MeterError::CaptureThread)?,
            None => 0,
        };

        // If start succeeded, capture is already moved. If not, drop it now.
        self.capture = None;
        Ok(read)
    }

    /// Turns one captured Ethernet frame into a `DecodedPacket`.
    ///
    /// Frames that fail to parse are returned with no layers so they are still
    /// counted by the meter.
    pub fn decode_packet(header: &PacketHeader, data: &[u8]) -> DecodedPacket {
        Self::decode_frame(packet_timestamp(header), data)
    }

    pub fn decode_frame(timestamp: f64, data: &[u8]) -> DecodedPacket {
        let mut packet = DecodedPacket::undecoded(timestamp, data.to_vec());

        let parsed = match PacketHeaders::from_ethernet_slice(data) {
            Ok(parsed) => parsed,
            Err(e) => {
                debug!("Failed to parse packet at {timestamp}: {e}");
                return packet;
            }
        };

        if let Some(LinkHeader::Ethernet2(eth)) = &parsed.link {
            packet.ethernet = Some(EthernetAddrs { src: eth.source, dst: eth.destination });
        }

        // Outermost tag wins for stacked VLANs.
        packet.vlan_id = parsed.link_exts.iter().find_map(|ext| match ext {
            LinkExtHeader::Vlan(vlan) => Some(vlan.vlan_id.value()),
            _ => None,
        });

        packet.network = match &parsed.net {
            Some(NetHeaders::Ipv4(ipv4, _)) => NetworkLayer::Ipv4 {
                src: Ipv4Addr::from(ipv4.source),
                dst: Ipv4Addr::from(ipv4.destination),
            },
            Some(NetHeaders::Ipv6(ipv6, _)) => NetworkLayer::Ipv6 {
                src: Ipv6Addr::from(ipv6.source),
                dst: Ipv6Addr::from(ipv6.destination),
            },
            _ => NetworkLayer::None,
        };

        packet.transport = match &parsed.transport {
            Some(TransportHeader::Tcp(tcp)) => TransportLayer::Tcp {
                sport: tcp.source_port,
                dport: tcp.destination_port,
                flags: TcpFlags {
                    cwr: tcp.cwr,
                    ece: tcp.ece,
                    urg: tcp.urg,
                    ack: tcp.ack,
                    psh: tcp.psh,
                    rst: tcp.rst,
                    syn: tcp.syn,
                    fin: tcp.fin,
                },
            },
            Some(TransportHeader::Udp(udp)) => TransportLayer::Udp {
                sport: udp.source_port,
                dport: udp.destination_port,
            },
            _ => TransportLayer::None,
        };

        packet
    }
}

/// Capture time in seconds: whole seconds plus the microsecond fraction.
fn packet_timestamp(header: &PacketHeader) -> f64 {
    header.ts.tv_sec as f64 + header.ts.tv_usec as f64 / 1_000_000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use etherparse::PacketBuilder;

    const MAC_A: [u8; 6] = [0x02, 0, 0, 0, 0, 0x0a];
    const MAC_B: [u8; 6] = [0x02, 0, 0, 0, 0, 0x0b];

    fn tcp_frame() -> Vec<u8> {
        let builder = PacketBuilder::ethernet2(MAC_A, MAC_B)
            .ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64)
            .tcp(40000, 443, 1, 1024)
            .syn()
            .ack(7);
        let payload = [0xab; 12];
        let mut frame = Vec::with_capacity(builder.size(payload.len()));
        builder.write(&mut frame, &payload).unwrap();
        frame
    }

    #[test]
    fn decodes_ethernet_ipv4_tcp() {
        let frame = tcp_frame();
        let pkt = PacketSniffer::decode_frame(12.25, &frame);

        assert_eq!(pkt.timestamp, 12.25);
        assert_eq!(pkt.len(), frame.len());
        assert_eq!(pkt.ethernet, Some(EthernetAddrs { src: MAC_A, dst: MAC_B }));
        assert_eq!(pkt.vlan_id, None);
        assert_eq!(
            pkt.network,
            NetworkLayer::Ipv4 { src: Ipv4Addr::new(10, 0, 0, 1), dst: Ipv4Addr::new(10, 0, 0, 2) }
        );
        match pkt.transport {
            TransportLayer::Tcp { sport, dport, flags } => {
                assert_eq!((sport, dport), (40000, 443));
                assert!(flags.syn && flags.ack);
                assert!(!flags.fin && !flags.rst);
            }
            other => panic!("expected TCP, got {other:?}"),
        }
    }

    #[test]
    fn decodes_ethernet_ipv6_udp() {
        let src = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 1];
        let dst = [0x20, 0x01, 0x0d, 0xb8, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 2];
        let builder = PacketBuilder::ethernet2(MAC_A, MAC_B).ipv6(src, dst, 32).udp(5353, 53);
        let mut frame = Vec::new();
        builder.write(&mut frame, &[1, 2, 3, 4]).unwrap();

        let pkt = PacketSniffer::decode_frame(0.5, &frame);
        assert_eq!(
            pkt.network,
            NetworkLayer::Ipv6 { src: Ipv6Addr::from(src), dst: Ipv6Addr::from(dst) }
        );
        assert_eq!(pkt.transport, TransportLayer::Udp { sport: 5353, dport: 53 });
    }

    #[test]
    fn decodes_802_1q_vlan_id() {
        let ip = PacketBuilder::ipv4([10, 0, 0, 1], [10, 0, 0, 2], 64).tcp(40000, 443, 1, 1024);
        let mut ip_bytes = Vec::new();
        ip.write(&mut ip_bytes, &[]).unwrap();

        let mut frame = Vec::new();
        frame.extend_from_slice(&MAC_B);
        frame.extend_from_slice(&MAC_A);
        frame.extend_from_slice(&[0x81, 0x00]);
        // PCP 5, VLAN 301
        frame.extend_from_slice(&(0xa000u16 | 301).to_be_bytes());
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&ip_bytes);

        let pkt = PacketSniffer::decode_frame(1.0, &frame);
        assert_eq!(pkt.vlan_id, Some(301));
        assert_eq!(pkt.ethernet, Some(EthernetAddrs { src: MAC_A, dst: MAC_B }));
        assert!(matches!(pkt.transport, TransportLayer::Tcp { sport: 40000, dport: 443, .. }));
    }

    #[test]
    fn garbage_frame_is_kept_but_undecoded() {
        let junk = [0u8; 5];
        let pkt = PacketSniffer::decode_frame(3.0, &junk);
        assert_eq!(pkt.ethernet, None);
        assert_eq!(pkt.network, NetworkLayer::None);
        assert_eq!(pkt.transport, TransportLayer::None);
        assert_eq!(pkt.data.len(), 5);
    }
}
