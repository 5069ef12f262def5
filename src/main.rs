use anyhow::Context;
use clap::Parser;
use env_logger::Env;
use std::path::PathBuf;

use flowmeter_lib::{run_capture, ConfigFile};

/// A program to evaluate IP-based flows
#[derive(Parser, Debug)]
#[command(name = "flowmeter", version, about)]
struct Cli {
    /// Path to .pcap/.pcapng file
    #[arg(short, long, value_name = "PCAP")]
    input_path: PathBuf,

    /// Path to output .csv file
    #[arg(short, long, value_name = "CSV")]
    output_path: PathBuf,

    /// Seconds from a flow's first packet before it is cut and restarted
    #[arg(short, long, value_name = "SECS")]
    active_timeout: Option<f64>,

    /// Seconds without packets before a flow is closed
    #[arg(short = 't', long, value_name = "SECS")]
    idle_timeout: Option<f64>,

    /// Minimum capture-clock gap between two timeout sweeps (default: 1)
    #[arg(long, value_name = "SECS")]
    status_interval: Option<f64>,

    /// Leave out the per-packet entropy statistics
    #[arg(long)]
    no_entropy: bool,

    /// JSON file with default settings; command line flags take precedence
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,
}

impl Cli {
    fn overrides(&self) -> ConfigFile {
        ConfigFile {
            active_timeout: self.active_timeout,
            idle_timeout: self.idle_timeout,
            status_interval: self.status_interval,
            entropy: self.no_entropy.then_some(false),
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let base = match &cli.config {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::default(),
    };
    let config = base
        .merge(cli.overrides())
        .into_config()
        .context("invalid meter configuration")?;

    let summary = run_capture(&cli.input_path, &cli.output_path, config).with_context(|| {
        format!(
            "failed to meter {} into {}",
            cli.input_path.display(),
            cli.output_path.display()
        )
    })?;

    println!("{summary}");
    Ok(())
}
