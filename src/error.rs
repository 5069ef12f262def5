//! Error types shared by the capture reader, the flow table and the exporter.

use std::path::PathBuf;

/// Failure of a meter run.
///
/// Capture errors can only surface while opening the input; later read
/// failures end the stream instead. Output errors abort the run, keeping
/// whatever rows were already flushed.
#[derive(Debug, thiserror::Error)]
pub enum MeterError {
    /// The capture file could not be opened or read as pcap/pcapng.
    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("capture is not initialized, call init_sniffer first")]
    CaptureNotInitialized,

    #[error("capture reader is already running")]
    CaptureAlreadyRunning,

    /// The reader thread panicked.
    #[error("capture reader thread terminated abnormally")]
    CaptureThread,

    /// Writing a row to the output sink failed.
    #[error("output error: {0}")]
    Output(#[from] csv::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Invalid or incomplete meter configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{name} must be {expected}, got {value}")]
    InvalidValue {
        name: &'static str,
        expected: &'static str,
        value: f64,
    },

    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_convert_into_meter_errors() {
        let err: MeterError = ConfigError::Missing("idle_timeout").into();
        assert!(matches!(err, MeterError::Config(ConfigError::Missing("idle_timeout"))));
        assert_eq!(err.to_string(), "idle_timeout is required");
    }

    #[test]
    fn invalid_value_message_names_the_field() {
        let err = ConfigError::InvalidValue {
            name: "active_timeout",
            expected: "a finite number greater than 0",
            value: -1.0,
        };
        assert_eq!(
            err.to_string(),
            "active_timeout must be a finite number greater than 0, got -1"
        );
    }

    #[test]
    fn io_errors_convert_into_meter_errors() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: MeterError = io_err.into();
        assert!(matches!(err, MeterError::Io(_)));
        assert!(err.to_string().contains("read-only"));
    }
}
