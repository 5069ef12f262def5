pub mod feature_processor;
mod engine;
mod exporter;
mod flow;
mod service;
mod statistic;

pub use engine::{FlowTable, TableStats};
pub use exporter::{CsvExporter, FlowSink};
pub use feature_processor::{run_capture, FlowMeter};
pub use flow::{
    bit_gini, BidirectionalFlow, ExpirationCode, FlowDirection, FlowRecord, TcpFlagCounts,
};
pub use service::{FlowKey, IpVersion, Service, ServicePair, TransportProto};
pub use statistic::{OnlineStatistic, Sample};
