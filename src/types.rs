use std::fmt;
use std::time::Duration;

/// Outcome of one meter run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    /// Every packet read from the source, decodable or not.
    pub packets: u64,
    pub dropped_packets: u64,
    pub flows: u64,
    pub rows: u64,
    pub elapsed: Duration,
    /// The run was stopped before the source was exhausted.
    pub cancelled: bool,
}

impl RunSummary {
    pub fn packets_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64().max(1e-9);
        self.packets as f64 / secs
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Read {} packets in {:.6} seconds ({:.2} pkts/sec)",
            self.packets,
            self.elapsed.as_secs_f64(),
            self.packets_per_second()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_line_reports_rate() {
        let summary = RunSummary {
            packets: 500,
            elapsed: Duration::from_millis(250),
            ..Default::default()
        };
        assert_eq!(summary.packets_per_second(), 2000.0);
        assert_eq!(summary.to_string(), "Read 500 packets in 0.250000 seconds (2000.00 pkts/sec)");
    }

    #[test]
    fn zero_elapsed_does_not_divide_by_zero() {
        let summary = RunSummary { packets: 3, ..Default::default() };
        assert!(summary.packets_per_second().is_finite());
    }
}
