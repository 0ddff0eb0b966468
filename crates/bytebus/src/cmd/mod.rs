use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod channels;
pub mod doctor;
pub mod drain;
pub mod listen;
pub mod publish;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Publish messages on a channel.
    Publish(PublishArgs),
    /// Subscribe and print received messages.
    Listen(ListenArgs),
    /// Subscribe, let messages accumulate briefly, and print the backlog.
    Drain(DrainArgs),
    /// List channel sockets in the bus directory.
    Channels(ChannelsArgs),
    /// Run local environment health checks.
    Doctor(DoctorArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Publish(args) => publish::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Drain(args) => drain::run(args, format),
        Command::Channels(args) => channels::run(args, format),
        Command::Doctor(args) => doctor::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Channel to publish on.
    pub channel: String,
    /// Raw string payload.
    #[arg(long, conflicts_with = "file")]
    pub data: Option<String>,
    /// Read payload from file. Without --data or --file, stdin is read.
    #[arg(long, conflicts_with = "data")]
    pub file: Option<PathBuf>,
    /// Wait for N subscribers to attach before sending.
    #[arg(long, value_name = "N")]
    pub wait_subs: Option<usize>,
    /// Maximum time to wait for subscribers (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub settle_timeout: String,
    /// Send the payload N times.
    #[arg(long, default_value_t = 1)]
    pub repeat: usize,
    /// Pause between repeated sends (e.g. 100ms).
    #[arg(long)]
    pub interval: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Channel to subscribe to.
    pub channel: String,
    /// Keep only the latest unread message.
    #[arg(long)]
    pub conflate: bool,
    /// Receive deadline (e.g. 500ms). Exits with code 124 when it elapses.
    #[arg(long)]
    pub timeout: Option<String>,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct DrainArgs {
    /// Channel to subscribe to.
    pub channel: String,
    /// Keep only the latest unread message.
    #[arg(long)]
    pub conflate: bool,
    /// How long to let messages accumulate before draining.
    #[arg(long, default_value = "100ms")]
    pub settle: String,
}

#[derive(Args, Debug)]
pub struct ChannelsArgs {
    /// Bus directory to scan. Default: this process's bus directory.
    #[arg(long, value_name = "DIR")]
    pub dir: Option<PathBuf>,
}

#[derive(Args, Debug, Default)]
pub struct DoctorArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
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

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}
