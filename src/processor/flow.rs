use crate::capture::{DecodedPacket, TcpFlags};
use super::service::{MacDisplay, ServicePair, TransportProto};
use super::statistic::OnlineStatistic;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection {
    Forward,
    Reverse,
    Bidirectional,
}

impl FlowDirection {
    /// Column prefix of this direction's block.
    pub fn label(self) -> &'static str {
        match self {
            FlowDirection::Forward => "src2dst",
            FlowDirection::Reverse => "dst2src",
            FlowDirection::Bidirectional => "bidirectional",
        }
    }
}

/// Why a row was emitted. The numeric value is what lands in the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExpirationCode {
    Uninitialized = 0,
    Alive = 1,
    ActiveTimeout = 2,
    IdleTimeout = 3,
    SessionEnd = 4,
    UserSpecified = 5,
}

impl ExpirationCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TcpFlagCounts {
    pub syn: u64,
    pub cwr: u64,
    pub ece: u64,
    pub urg: u64,
    pub ack: u64,
    pub psh: u64,
    pub rst: u64,
    pub fin: u64,
}

impl TcpFlagCounts {
    fn record(&mut self, flags: TcpFlags) {
        let bits = [
            flags.syn, flags.cwr, flags.ece, flags.urg, flags.ack, flags.psh, flags.rst, flags.fin,
        ];
        let counters = [
            &mut self.syn,
            &mut self.cwr,
            &mut self.ece,
            &mut self.urg,
            &mut self.ack,
            &mut self.psh,
            &mut self.rst,
            &mut self.fin,
        ];
        for (counter, bit) in counters.into_iter().zip(bits) {
            *counter += u64::from(bit);
        }
    }

    fn as_array(&self) -> [u64; 8] {
        [self.syn, self.cwr, self.ece, self.urg, self.ack, self.psh, self.rst, self.fin]
    }
}

const FLAG_NAMES: [&str; 8] = ["syn", "cwr", "ece", "urg", "ack", "psh", "rst", "fin"];

/// Gini impurity of the bit population of `data`: 0 for all-zero or all-one
/// bytes, 0.5 when ones and zeros are balanced.
pub fn bit_gini(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let ones: u64 = data.iter().map(|b| b.count_ones() as u64).sum();
    let p1 = ones as f64 / (data.len() as f64 * 8.0);
    let p0 = 1.0 - p1;
    1.0 - (p1 * p1 + p0 * p0)
}

/// Counters and statistics for one direction of a flow.
#[derive(Debug, Clone)]
pub struct FlowRecord {
    direction: FlowDirection,
    transport: TransportProto,

    pub first_seen: f64,
    pub last_seen: f64,
    pub duration: f64,
    pub packet_count: u64,
    pub byte_count: u64,

    /// Fed the running byte count after each packet.
    pub packet_size: OnlineStatistic<u64>,
    pub packet_iat: OnlineStatistic<f64>,
    pub packet_entropy: Option<OnlineStatistic<f64>>,

    pub flags: TcpFlagCounts,
}

impl FlowRecord {
    pub fn new(direction: FlowDirection, transport: TransportProto, entropy: bool) -> Self {
        let d = direction.label();
        Self {
            direction,
            transport,
            first_seen: f64::INFINITY,
            last_seen: f64::NEG_INFINITY,
            duration: 0.0,
            packet_count: 0,
            byte_count: 0,
            packet_size: OnlineStatistic::new(format!("{d}_ps")),
            packet_iat: OnlineStatistic::new(format!("{d}_piat")),
            packet_entropy: entropy.then(|| OnlineStatistic::new(format!("{d}_ent"))),
            flags: TcpFlagCounts::default(),
        }
    }

    pub fn direction(&self) -> FlowDirection {
        self.direction
    }

    pub fn is_empty(&self) -> bool {
        self.packet_count == 0
    }

    /// Captures are not re-sorted: a packet stamped earlier than the last one
    /// widens `first_seen` instead of moving `last_seen` back, and its
    /// inter-arrival sample is 0.
    pub fn update(&mut self, pkt: &DecodedPacket, timestamp: f64) {
        if self.packet_count > 0 {
            self.packet_iat.update((timestamp - self.last_seen).max(0.0));
        }
        self.packet_count += 1;
        self.first_seen = self.first_seen.min(timestamp);
        self.last_seen = self.last_seen.max(timestamp);
        self.duration = self.last_seen - self.first_seen;

        self.byte_count += pkt.len() as u64;
        self.packet_size.update(self.byte_count);

        if let Some(entropy) = self.packet_entropy.as_mut() {
            entropy.update(bit_gini(&pkt.data));
        }

        if self.transport == TransportProto::Tcp {
            if let Some(flags) = pkt.tcp_flags() {
                self.flags.record(flags);
            }
        }
    }

    /// Recomputes the duration; an empty record keeps a duration of 0.
    pub fn finalize(&mut self) {
        self.duration = if self.is_empty() { 0.0 } else { self.last_seen - self.first_seen };
    }

    /// Clears all counters. Direction and transport are kept.
    pub fn reset(&mut self) {
        self.first_seen = f64::INFINITY;
        self.last_seen = f64::NEG_INFINITY;
        self.duration = 0.0;
        self.packet_count = 0;
        self.byte_count = 0;
        self.packet_size.reset();
        self.packet_iat.reset();
        if let Some(entropy) = self.packet_entropy.as_mut() {
            entropy.reset();
        }
        self.flags = TcpFlagCounts::default();
    }

    pub fn column_names(&self) -> Vec<String> {
        let d = self.direction.label();
        let mut cols = vec![
            format!("{d}_first_seen"),
            format!("{d}_last_seen"),
            format!("{d}_duration"),
            format!("{d}_packet_count"),
            format!("{d}_bytes"),
        ];
        cols.extend(self.packet_size.column_names());
        cols.extend(self.packet_iat.column_names());
        if let Some(entropy) = &self.packet_entropy {
            cols.extend(entropy.column_names());
        }
        cols.extend(FLAG_NAMES.iter().map(|f| format!("{d}_{f}_count")));
        cols
    }

    pub fn fields(&self) -> Vec<String> {
        let (first, last) = if self.is_empty() {
            (0.0, 0.0)
        } else {
            (self.first_seen, self.last_seen)
        };
        let mut out = vec![
            first.to_string(),
            last.to_string(),
            self.duration.to_string(),
            self.packet_count.to_string(),
            self.byte_count.to_string(),
        ];
        out.extend(self.packet_size.fields());
        out.extend(self.packet_iat.fields());
        if let Some(entropy) = &self.packet_entropy {
            out.extend(entropy.fields());
        }
        out.extend(self.flags.as_array().iter().map(u64::to_string));
        out
    }
}

/// A flow in both directions, owned by the flow table while it is alive.
#[derive(Debug, Clone)]
pub struct BidirectionalFlow {
    /// Pair of the packet that created the entry; its `src` defines "forward".
    pub pair: ServicePair,
    pub init_id: u64,
    pub sub_init_id: u64,
    pub expiration: ExpirationCode,

    pub forward: FlowRecord,
    pub reverse: FlowRecord,
    pub bidirectional: FlowRecord,
}

impl BidirectionalFlow {
    pub fn new(pair: ServicePair, init_id: u64, entropy: bool) -> Self {
        let transport = pair.key.transport();
        Self {
            pair,
            init_id,
            sub_init_id: 0,
            expiration: ExpirationCode::Alive,
            forward: FlowRecord::new(FlowDirection::Forward, transport, entropy),
            reverse: FlowRecord::new(FlowDirection::Reverse, transport, entropy),
            bidirectional: FlowRecord::new(FlowDirection::Bidirectional, transport, entropy),
        }
    }

    pub fn update(&mut self, pkt: &DecodedPacket, pair: &ServicePair, timestamp: f64) {
        self.bidirectional.update(pkt, timestamp);

        if pair.src == self.pair.src {
            self.forward.update(pkt, timestamp);
        } else {
            self.reverse.update(pkt, timestamp);
        }
    }

    /// True when the current generation has seen no packet.
    pub fn is_empty(&self) -> bool {
        self.bidirectional.is_empty()
    }

    pub fn last_update_ts(&self) -> f64 {
        self.bidirectional.last_seen
    }

    /// Whether the active or idle timeout has fired at `now`. The active
    /// timeout is checked first.
    ///
    /// A recycled generation that has seen no packet still holds the reset
    /// sentinels, so it is never active-expired and idles out on the next
    /// sweep.
    pub fn check_timeout(
        &self,
        now: f64,
        active_timeout: f64,
        idle_timeout: f64,
    ) -> Option<ExpirationCode> {
        if now - self.bidirectional.first_seen >= active_timeout {
            Some(ExpirationCode::ActiveTimeout)
        } else if now - self.bidirectional.last_seen >= idle_timeout {
            Some(ExpirationCode::IdleTimeout)
        } else {
            None
        }
    }

    /// Marks the flow with its closing reason and fixes the durations.
    pub fn expire(&mut self, code: ExpirationCode) {
        self.expiration = code;
        self.forward.finalize();
        self.reverse.finalize();
        self.bidirectional.finalize();
    }

    /// Starts a new generation under the same key and `init_id`.
    pub fn recycle(&mut self) {
        self.sub_init_id += 1;
        self.forward.reset();
        self.reverse.reset();
        self.bidirectional.reset();
        self.expiration = ExpirationCode::Alive;
    }

    pub fn column_names(&self) -> Vec<String> {
        let mut cols: Vec<String> = [
            "init_id", "sub_init_id", "expiration_reason",
            "src_mac", "dst_mac", "src_ip", "dst_ip", "sport", "dport", "vlan_id", "ip_version",
        ]
        .iter()
        .map(|c| c.to_string())
        .collect();
        cols.extend(self.bidirectional.column_names());
        cols.extend(self.forward.column_names());
        cols.extend(self.reverse.column_names());
        cols
    }

    pub fn fields(&self) -> Vec<String> {
        let (src, dst, version) = (&self.pair.src, &self.pair.dst, self.pair.ip_version);
        let mut out = vec![
            self.init_id.to_string(),
            self.sub_init_id.to_string(),
            self.expiration.code().to_string(),
            MacDisplay(src.mac_addr()).to_string(),
            MacDisplay(dst.mac_addr()).to_string(),
            version.format_addr(src.ip_addr()),
            version.format_addr(dst.ip_addr()),
            src.port().to_string(),
            dst.port().to_string(),
            self.pair.key.vlan_id().to_string(),
            version.number().to_string(),
        ];
        out.extend(self.bidirectional.fields());
        out.extend(self.forward.fields());
        out.extend(self.reverse.fields());
        out
    }
}
