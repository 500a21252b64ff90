use std::path::Path;
use std::time::Duration;

use clap::{Args, Subcommand, ValueEnum};
use hwlink_session::{OverflowPolicy, SessionConfig};
use hwlink_transport::Endpoint;

use crate::exit::{session_error, transport_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod monitor;
pub mod ping;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Write a single raw frame to a device.
    Send(SendArgs),
    /// Connect a session and print every decoded device message.
    Monitor(MonitorArgs),
    /// Send a Ping and wait for the device's Success or Failure.
    Ping(PingArgs),
    /// Show version information.
    Version(VersionArgs),
}

/// Settings shared by every subcommand.
pub struct Context {
    pub format: OutputFormat,
    pub config: SessionConfig,
}

pub fn run(command: Command, ctx: &Context) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, ctx),
        Command::Monitor(args) => monitor::run(args, ctx),
        Command::Ping(args) => ping::run(args, ctx),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Device address: host:port or unix:/path.
    pub address: String,
    /// Header code of the frame.
    #[arg(long, short = 'c')]
    pub code: u16,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "hex"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "hex"])]
    pub data: Option<String>,
    /// Hex-encoded payload (e.g. 0102ff).
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub hex: Option<String>,
    /// Wait for one reply frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct MonitorArgs {
    /// Device address: host:port or unix:/path.
    pub address: String,
    /// Exit after printing N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Behaviour when the print queue is full. Overrides the config file.
    #[arg(long, value_enum)]
    pub overflow: Option<OverflowArg>,
    /// Send Initialize after connecting.
    #[arg(long)]
    pub initialize: bool,
}

#[derive(Args, Debug)]
pub struct PingArgs {
    /// Device address: host:port or unix:/path.
    pub address: String,
    /// Text the device should echo back.
    #[arg(long)]
    pub message: Option<String>,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum OverflowArg {
    Block,
    DropOldest,
    Error,
}

impl From<OverflowArg> for OverflowPolicy {
    fn from(arg: OverflowArg) -> Self {
        match arg {
            OverflowArg::Block => OverflowPolicy::Block,
            OverflowArg::DropOldest => OverflowPolicy::DropOldest,
            OverflowArg::Error => OverflowPolicy::Error,
        }
    }
}

/// Load `--config`, or the defaults when it is absent.
pub fn load_config(path: Option<&Path>) -> CliResult<SessionConfig> {
    match path {
        Some(path) => {
            SessionConfig::from_file(path).map_err(|err| session_error("invalid config", err))
        }
        None => Ok(SessionConfig::default()),
    }
}

/// Resolve a device address, applying the configured connect timeout.
pub fn endpoint(address: &str, config: &SessionConfig) -> CliResult<Endpoint> {
    let endpoint =
        Endpoint::parse(address).map_err(|err| transport_error("invalid address", err))?;
    Ok(match config.connect_timeout() {
        Some(timeout) => endpoint.with_connect_timeout(timeout),
        None => endpoint,
    })
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
