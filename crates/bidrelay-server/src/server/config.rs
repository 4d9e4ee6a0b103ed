use anyhow::bail;
use clap::{Parser, ValueEnum};
use core::time::Duration;
use std::path::PathBuf;

/// How one request queries its vendors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum FanOut {
    /// One vendor at a time, in registry order. Latency is the sum of all
    /// vendor latencies.
    Sequential,
    /// All vendors at once, joined in registry order. Latency is the slowest
    /// vendor's latency.
    Concurrent,
}

/// Runtime configuration for the `bidrelay-server` binary.
///
/// All values are parsed from CLI arguments or environment variables (a
/// `.env` file is loaded first), with defaults suitable for a single host.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "bidrelay-server",
    version,
    about = "A gRPC relay that collects product bids from a set of vendors"
)]
pub struct CliArgs {
    /// Path of the vendor registry: one vendor address (`host:port`) per
    /// line. The file is re-read for every request.
    ///
    /// Environment variable: `VENDOR_REGISTRY`
    #[arg(long, env = "VENDOR_REGISTRY")]
    pub vendor_registry: PathBuf,

    /// Address to listen on (TCP or Unix socket path; use --uds for Unix
    /// socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/bidrelay.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be
    /// a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Number of worker threads processing accepted requests. Bounds how many
    /// requests fan out to vendors at the same time.
    ///
    /// Environment variable: `NUM_WORKERS`
    #[arg(long, env = "NUM_WORKERS", default_value_t = num_cpus::get())]
    pub num_workers: usize,

    /// Deadline in milliseconds for connecting to and calling one vendor.
    /// `0` waits indefinitely.
    ///
    /// Environment variable: `VENDOR_TIMEOUT_MS`
    #[arg(long, env = "VENDOR_TIMEOUT_MS", default_value_t = 5_000)]
    pub vendor_timeout_ms: u64,

    /// Whether a request queries its vendors one after another or all at
    /// once. Replies list bids in registry order either way.
    ///
    /// Environment variable: `FAN_OUT`
    #[arg(long, env = "FAN_OUT", value_enum, default_value_t = FanOut::Concurrent)]
    pub fan_out: FanOut,

    /// Capacity of the queue between the gRPC handler and the event loop.
    ///
    /// Environment variable: `INBOUND_BUFFER_SIZE`
    #[arg(long, env = "INBOUND_BUFFER_SIZE", default_value_t = 1024)]
    pub inbound_buffer_size: usize,

    /// Seconds to wait for in-flight requests during shutdown.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 10)]
    pub shutdown_timeout: u64,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub vendor_registry: PathBuf,
    pub server_addr: String,
    pub uds: bool,
    pub num_workers: usize,
    pub vendor_timeout: Option<Duration>,
    pub fan_out: FanOut,
    pub inbound_buffer_size: usize,
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Default configuration serving the given registry.
    pub fn new(vendor_registry: impl Into<PathBuf>) -> Self {
        Self {
            vendor_registry: vendor_registry.into(),
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
            num_workers: num_cpus::get(),
            vendor_timeout: Some(Duration::from_secs(5)),
            fan_out: FanOut::Concurrent,
            inbound_buffer_size: 1024,
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.num_workers == 0 {
            bail!("NUM_WORKERS must be greater than 0");
        }

        if args.inbound_buffer_size == 0 {
            bail!("INBOUND_BUFFER_SIZE must be greater than 0");
        }

        if args.server_addr.trim().is_empty() {
            bail!("SERVER_ADDR must not be empty");
        }

        let vendor_timeout =
            (args.vendor_timeout_ms > 0).then(|| Duration::from_millis(args.vendor_timeout_ms));

        Ok(Self {
            vendor_registry: args.vendor_registry,
            server_addr: args.server_addr,
            uds: args.uds,
            num_workers: args.num_workers,
            vendor_timeout,
            fan_out: args.fan_out,
            inbound_buffer_size: args.inbound_buffer_size,
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> anyhow::Result<ServerConfig> {
        let mut argv = vec!["bidrelay-server", "--vendor-registry", "vendors.txt"];
        argv.extend_from_slice(extra);
        ServerConfig::try_from(CliArgs::try_parse_from(argv)?)
    }

    #[test]
    fn defaults() {
        let config = parse(&["--num-workers", "3"]).unwrap();
        assert_eq!(config.vendor_registry, PathBuf::from("vendors.txt"));
        assert_eq!(config.server_addr, "0.0.0.0:50051");
        assert!(!config.uds);
        assert_eq!(config.num_workers, 3);
        assert_eq!(config.vendor_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.fan_out, FanOut::Concurrent);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(10));
    }

    #[test]
    fn zero_timeout_disables_vendor_deadline() {
        let config = parse(&["--vendor-timeout-ms", "0", "--fan-out", "sequential"]).unwrap();
        assert_eq!(config.vendor_timeout, None);
        assert_eq!(config.fan_out, FanOut::Sequential);
    }

    #[test]
    fn rejects_empty_pool_and_buffer() {
        assert!(parse(&["--num-workers", "0"]).is_err());
        assert!(parse(&["--inbound-buffer-size", "0"]).is_err());
    }

    #[test]
    fn registry_is_required() {
        assert!(CliArgs::try_parse_from(["bidrelay-server"]).is_err());
    }
}
