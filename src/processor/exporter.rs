use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::flow::BidirectionalFlow;
use crate::error::MeterError;

/// Destination for finished flows.
pub trait FlowSink {
    /// Called once per run, before the first row.
    fn write_header(&mut self, columns: &[String]) -> Result<(), MeterError>;

    fn write_flow(&mut self, flow: &BidirectionalFlow) -> Result<(), MeterError>;

    fn flush(&mut self) -> Result<(), MeterError>;
}

/// Writes one CSV row per expired flow.
pub struct CsvExporter<W: Write> {
    writer: csv::Writer<W>,
    rows: u64,
}

impl CsvExporter<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, MeterError> {
        let file = File::create(path)?;
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> CsvExporter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            // rows are fixed-width per run but the header is written by hand
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(inner),
            rows: 0,
        }
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W, MeterError> {
        self.writer
            .into_inner()
            .map_err(|e| {
                MeterError::Io(std::io::Error::new(e.error().kind(), e.error().to_string()))
            })
    }
}

impl<W: Write> FlowSink for CsvExporter<W> {
    fn write_header(&mut self, columns: &[String]) -> Result<(), MeterError> {
        self.writer.write_record(columns)?;
        Ok(())
    }

    fn write_flow(&mut self, flow: &BidirectionalFlow) -> Result<(), MeterError> {
        self.writer.write_record(flow.fields())?;
        self.rows += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), MeterError> {
        self.writer.flush()?;
        Ok(())
    }
}
