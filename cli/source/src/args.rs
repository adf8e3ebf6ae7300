//! CLI argument definitions for scanflow.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

pub use sf_cli_common::LogLevel;

/// Discover S3 objects and deliver them to a handler.
///
/// Objects are found by scanning buckets under leased partitions, by
/// polling an SQS queue for S3 or EventBridge notifications, or both.
/// Sources are described in a YAML file; flags override AWS access and
/// runtime settings.
///
/// ## Examples
///
/// Scan buckets and print each object as a JSON line:
///   scanflow -c source.yaml --mode scan -d stdout
///
/// Poll a queue with four pollers against LocalStack:
///   scanflow -c source.yaml --mode queue -w 4 --sqs-endpoint http://localhost:4566
#[derive(Parser, Debug)]
#[command(name = "scanflow")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Source configuration file (YAML)
    #[arg(short = 'c', long, env = "SCANFLOW_CONFIG")]
    pub config: PathBuf,

    /// Loops per discovery mode, overriding the config file
    #[arg(short = 'w', long, env = "SCANFLOW_WORKERS", value_parser = parse_positive_usize)]
    pub workers: Option<usize>,

    /// Discovery modes to run
    #[arg(short = 'm', long, value_enum, default_value = "both")]
    pub mode: Mode,

    /// Object handler
    #[arg(short = 'd', long, value_enum, default_value = "stdout")]
    pub destination: DestinationType,

    /// Name attached to exported metrics
    #[arg(long, env = "SCANFLOW_SOURCE_ID", default_value = "scanflow")]
    pub source_id: String,

    /// Seconds to wait for loops to finish after Ctrl-C
    #[arg(long, default_value = "30", value_parser = clap::value_parser!(u64).range(1..))]
    pub shutdown_timeout: u64,

    // === AWS Configuration ===
    /// AWS region
    #[arg(long, env = "AWS_REGION", default_value = "us-east-1")]
    pub region: String,

    /// Custom S3 endpoint URL (for LocalStack)
    #[arg(long, env = "SCANFLOW_S3_ENDPOINT")]
    pub s3_endpoint: Option<String>,

    /// Custom SQS endpoint URL (for LocalStack)
    #[arg(long, env = "SCANFLOW_SQS_ENDPOINT")]
    pub sqs_endpoint: Option<String>,

    /// AWS access key ID
    #[arg(long, env = "AWS_ACCESS_KEY_ID")]
    pub access_key: Option<String>,

    /// AWS secret access key
    #[arg(long, env = "AWS_SECRET_ACCESS_KEY", hide_env_values = true)]
    pub secret_key: Option<String>,

    /// AWS profile name
    #[arg(long, env = "AWS_PROFILE")]
    pub profile: Option<String>,

    // === Observability ===
    /// OTLP gRPC endpoint for metrics export
    #[arg(long, env = "SCANFLOW_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,

    /// Log level
    #[arg(short = 'l', long, value_enum, default_value = "info")]
    pub log_level: LogLevel,
}

/// Which discovery loops to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Mode {
    /// Scan workers only
    Scan,
    /// Queue pollers only
    Queue,
    /// Every mode the config file enables
    Both,
}

impl Mode {
    pub fn runs_scan(self) -> bool {
        matches!(self, Mode::Scan | Mode::Both)
    }

    pub fn runs_queue(self) -> bool {
        matches!(self, Mode::Queue | Mode::Both)
    }
}

/// Object handler type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DestinationType {
    /// One JSON line per object on stdout
    Stdout,
    /// Count objects and bytes without output
    Stats,
}

/// Parse a positive usize (>= 1).
fn parse_positive_usize(s: &str) -> Result<usize, String> {
    let value: usize = s.parse().map_err(|_| format!("'{s}' is not a valid number"))?;
    if value < 1 {
        return Err(format!("{value} is not in 1.."));
    }
    Ok(value)
}
