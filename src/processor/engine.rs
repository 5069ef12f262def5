use log::debug;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::capture::DecodedPacket;
use crate::config::MeterConfig;
use crate::error::MeterError;
use super::exporter::FlowSink;
use super::flow::{BidirectionalFlow, ExpirationCode};
use super::service::{FlowKey, ServicePair};

/// Running counters of a flow table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Every packet offered to `process`.
    pub packets: u64,
    /// Packets that were associated with a flow.
    pub flow_packets: u64,
    /// Packets without Ethernet + IP + TCP/UDP headers.
    pub dropped: u64,
    pub flows_created: u64,
    pub rows_emitted: u64,
    pub recycles: u64,
}

/// Live flows keyed by `FlowKey`, swept for timeouts on the capture's clock.
pub struct FlowTable {
    config: MeterConfig,
    flows: HashMap<FlowKey, BidirectionalFlow>,
    next_init_id: u64,
    last_sweep: Option<f64>,
    header_written: bool,
    stats: TableStats,
}

impl FlowTable {
    pub fn new(config: MeterConfig) -> Self {
        Self {
            config,
            flows: HashMap::new(),
            next_init_id: 0,
            last_sweep: None,
            header_written: false,
            stats: TableStats::default(),
        }
    }

    pub fn config(&self) -> &MeterConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    pub fn stats(&self) -> TableStats {
        self.stats
    }

    pub fn get(&self, key: &FlowKey) -> Option<&BidirectionalFlow> {
        self.flows.get(key)
    }

    /// Returns the entry for `pair.key`, creating it with the next `init_id`
    /// if absent. The bool is true when the entry was created.
    pub fn lookup_or_create(&mut self, pair: &ServicePair) -> (&mut BidirectionalFlow, bool) {
        match self.flows.entry(pair.key) {
            Entry::Occupied(e) => (e.into_mut(), false),
            Entry::Vacant(e) => {
                let init_id = self.next_init_id;
                self.next_init_id += 1;
                self.stats.flows_created += 1;
                (e.insert(BidirectionalFlow::new(*pair, init_id, self.config.entropy())), true)
            }
        }
    }

    /// Feeds one packet: runs a sweep if the capture clock moved far enough,
    /// then updates the packet's flow. Packets without a usable flow identity
    /// are only counted.
    pub fn process<S: FlowSink>(
        &mut self,
        pkt: &DecodedPacket,
        sink: &mut S,
    ) -> Result<(), MeterError> {
        self.stats.packets += 1;
        let ts = pkt.timestamp;

        match self.last_sweep {
            None => self.last_sweep = Some(ts),
            Some(last) if ts - last > self.config.status_interval() => {
                self.sweep(ts, sink)?;
                self.last_sweep = Some(ts);
            }
            Some(_) => {}
        }

        let Some(pair) = ServicePair::from_packet(pkt) else {
            self.stats.dropped += 1;
            return Ok(());
        };

        let header_pending = !self.header_written;
        let (flow, _) = self.lookup_or_create(&pair);
        if header_pending {
            sink.write_header(&flow.column_names())?;
        }
        flow.update(pkt, &pair, ts);

        self.header_written = true;
        self.stats.flow_packets += 1;
        Ok(())
    }

    /// Applies the active and idle timeouts at capture time `now`.
    ///
    /// Active timeouts emit and recycle the entry in place; idle timeouts emit
    /// and remove it.
    pub fn sweep<S: FlowSink>(&mut self, now: f64, sink: &mut S) -> Result<(), MeterError> {
        let active_timeout = self.config.active_timeout();
        let idle_timeout = self.config.idle_timeout();
        let mut idle = Vec::new();

        for (key, flow) in self.flows.iter_mut() {
            match flow.check_timeout(now, active_timeout, idle_timeout) {
                Some(ExpirationCode::ActiveTimeout) => {
                    flow.expire(ExpirationCode::ActiveTimeout);
                    sink.write_flow(flow)?;
                    self.stats.rows_emitted += 1;
                    self.stats.recycles += 1;
                    debug!(
                        "Flow {} recycled at {now} (generation {})",
                        flow.init_id, flow.sub_init_id
                    );
                    flow.recycle();
                }
                Some(_) => idle.push(*key),
                None => {}
            }
        }

        for key in idle {
            if let Some(flow) = self.flows.remove(&key) {
                debug!("Flow {} idle since {}", flow.init_id, flow.last_update_ts());
                self.emit(flow, ExpirationCode::IdleTimeout, sink)?;
            }
        }
        Ok(())
    }

    /// Closes every remaining flow at end of stream.
    pub fn drain_all<S: FlowSink>(&mut self, sink: &mut S) -> Result<(), MeterError> {
        self.close_remaining(ExpirationCode::SessionEnd, sink)
    }

    /// Caller-driven closure of a single flow. Returns false if the key is unknown.
    pub fn close<S: FlowSink>(&mut self, key: &FlowKey, sink: &mut S) -> Result<bool, MeterError> {
        match self.flows.remove(key) {
            Some(flow) => {
                self.emit(flow, ExpirationCode::UserSpecified, sink)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Caller-driven closure of every flow.
    pub fn close_all<S: FlowSink>(&mut self, sink: &mut S) -> Result<(), MeterError> {
        self.close_remaining(ExpirationCode::UserSpecified, sink)
    }

    fn close_remaining<S: FlowSink>(
        &mut self,
        code: ExpirationCode,
        sink: &mut S,
    ) -> Result<(), MeterError> {
        let mut flows: Vec<BidirectionalFlow> = self.flows.drain().map(|(_, flow)| flow).collect();
        // stable output order
        flows.sort_by_key(|flow| flow.init_id);
        for flow in flows {
            self.emit(flow, code, sink)?;
        }
        Ok(())
    }

    /// Writes the terminal row of `flow`. A recycled generation that saw no
    /// packet still gets its row, with zeroed blocks.
    fn emit<S: FlowSink>(
        &mut self,
        mut flow: BidirectionalFlow,
        code: ExpirationCode,
        sink: &mut S,
    ) -> Result<(), MeterError> {
        flow.expire(code);
        sink.write_flow(&flow)?;
        self.stats.rows_emitted += 1;
        Ok(())
    }
}
