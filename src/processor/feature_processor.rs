use crossbeam_channel::bounded;
use log::info;
use std::path::Path;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Instant;

use crate::capture::{DecodedPacket, PacketSniffer};
use crate::config::MeterConfig;
use crate::error::MeterError;
use crate::types::RunSummary;
use super::engine::FlowTable;
use super::exporter::{CsvExporter, FlowSink};

/// Packets buffered between the reader thread and the meter.
const PACKET_QUEUE_CAPACITY: usize = 4096;

/// Drives a `FlowTable` over a packet stream, one packet at a time.
pub struct FlowMeter {
    running: Arc<AtomicBool>,
    table: FlowTable,
}

impl FlowMeter {
    pub fn new(config: MeterConfig) -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            table: FlowTable::new(config),
        }
    }

    /// Clearing this flag stops the run after the current packet; open flows
    /// are then closed as user-specified.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn table(&self) -> &FlowTable {
        &self.table
    }

    /// Consumes `packets` in order, then closes every remaining flow. The sink
    /// is flushed whether or not the run succeeds.
    pub fn run<I, S>(&mut self, packets: I, sink: &mut S) -> Result<RunSummary, MeterError>
    where
        I: IntoIterator<Item = DecodedPacket>,
        S: FlowSink,
    {
        let start = Instant::now();
        let result = self.consume(packets, sink);
        let flushed = sink.flush();
        let cancelled = result?;
        flushed?;

        let stats = self.table.stats();
        Ok(RunSummary {
            packets: stats.packets,
            dropped_packets: stats.dropped,
            flows: stats.flows_created,
            rows: stats.rows_emitted,
            elapsed: start.elapsed(),
            cancelled,
        })
    }

    fn consume<I, S>(&mut self, packets: I, sink: &mut S) -> Result<bool, MeterError>
    where
        I: IntoIterator<Item = DecodedPacket>,
        S: FlowSink,
    {
        for pkt in packets {
            if !self.running.load(Ordering::Relaxed) {
                self.table.close_all(sink)?;
                return Ok(true);
            }
            self.table.process(&pkt, sink)?;
        }
        self.table.drain_all(sink)?;
        Ok(false)
    }
}

/// Meters a capture file into a CSV file.
///
/// The capture and the output are both opened before any packet is read.
pub fn run_capture(
    input: &Path,
    output: &Path,
    config: MeterConfig,
) -> Result<RunSummary, MeterError> {
    info!("Processing {}", input.display());

    let (packet_tx, packet_rx) = bounded(PACKET_QUEUE_CAPACITY);
    let mut sniffer = PacketSniffer::new_with_sender(packet_tx);
    sniffer.init_sniffer(input)?;

    let mut exporter = CsvExporter::create(output)?;
    sniffer.start_sniffer()?;

    let mut meter = FlowMeter::new(config);
    let result = meter.run(packet_rx.iter(), &mut exporter);

    // Unblocks the reader if the meter bailed out early.
    drop(packet_rx);
    let read = sniffer.stop_sniffer()?;

    let summary = result?;
    info!(
        "Wrote {} rows for {} flows to {} ({} of {} packets not flow-associated)",
        exporter.rows_written(),
        summary.flows,
        output.display(),
        summary.dropped_packets,
        read
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::TcpFlags;
    use crate::processor::exporter::tests::RecordingSink;
    use crate::processor::flow::ExpirationCode;
    use crate::processor::service::tests::tcp_packet;

    const A: ([u8; 6], [u8; 4], u16) = ([0x0a; 6], [10, 9, 8, 7], 1111);
    const B: ([u8; 6], [u8; 4], u16) = ([0x0b; 6], [10, 9, 8, 6], 2222);

    fn packets(n: usize) -> Vec<DecodedPacket> {
        (0..n)
            .map(|i| {
                let (src, dst) = if i % 2 == 0 { (A, B) } else { (B, A) };
                tcp_packet(i as f64 * 0.01, src, dst, TcpFlags::default(), 80)
            })
            .collect()
    }

    #[test]
    fn run_reports_summary_and_session_end_rows() {
        let mut meter = FlowMeter::new(MeterConfig::new(120.0, 60.0).unwrap());
        let mut sink = RecordingSink::default();

        let summary = meter.run(packets(10), &mut sink).unwrap();

        assert_eq!(summary.packets, 10);
        assert_eq!(summary.flows, 1);
        assert_eq!(summary.rows, 1);
        assert!(!summary.cancelled);
        assert_eq!(sink.flows[0].expiration, ExpirationCode::SessionEnd);
        assert_eq!(sink.flows[0].forward.packet_count, 5);
        assert_eq!(sink.flows[0].reverse.packet_count, 5);
        assert!(meter.table().is_empty());
    }

    #[test]
    fn cleared_stop_flag_closes_flows_as_user_specified() {
        let mut meter = FlowMeter::new(MeterConfig::new(120.0, 60.0).unwrap());
        let stop = meter.stop_handle();
        let mut sink = RecordingSink::default();

        let mut seen = 0;
        let stream = packets(10).into_iter().inspect(|_| {
            seen += 1;
            if seen == 4 {
                stop.store(false, Ordering::Relaxed);
            }
        });
        let summary = meter.run(stream, &mut sink).unwrap();

        assert!(summary.cancelled);
        assert_eq!(summary.packets, 3);
        assert_eq!(sink.flows.len(), 1);
        assert_eq!(sink.flows[0].expiration, ExpirationCode::UserSpecified);
        assert_eq!(sink.flows[0].bidirectional.packet_count, 3);
    }

    #[test]
    fn empty_stream_writes_nothing() {
        let mut meter = FlowMeter::new(MeterConfig::new(120.0, 60.0).unwrap());
        let mut sink = RecordingSink::default();
        let summary = meter.run(Vec::new(), &mut sink).unwrap();
        assert_eq!(summary.packets, 0);
        assert!(sink.header.is_none());
        assert!(sink.flows.is_empty());
    }

    #[test]
    fn missing_capture_fails_before_output_is_created() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("flows.csv");
        let err = run_capture(
            &dir.path().join("missing.pcap"),
            &output,
            MeterConfig::new(120.0, 60.0).unwrap(),
        )
        .unwrap_err();

        assert!(matches!(err, MeterError::Capture(_)));
        assert!(!output.exists());
    }
}
