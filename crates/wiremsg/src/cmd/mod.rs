use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod robot;
pub mod send;
pub mod serve;
pub mod version;

/// Port the demo server listens on by default.
pub const DEFAULT_PORT: u16 = 60000;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the path server.
    Serve(ServeArgs),
    /// Run a simulated robot against a path server.
    Robot(RobotArgs),
    /// Send a single message.
    Send(SendArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args),
        Command::Robot(args) => robot::run(args),
        Command::Send(args) => send::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on.
    #[arg(long, short = 'p', env = "WIREMSG_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: std::net::IpAddr,
}

#[derive(Args, Debug)]
pub struct RobotArgs {
    /// Server host.
    #[arg(long, env = "WIREMSG_HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// Server port.
    #[arg(long, short = 'p', env = "WIREMSG_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Length of one simulation step (e.g. 1s, 250ms, 0s).
    #[arg(long, default_value = "1s")]
    pub step_delay: String,
    /// Stop after handling N messages.
    #[arg(long)]
    pub max_steps: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server host.
    #[arg(long, env = "WIREMSG_HOST", default_value = "127.0.0.1")]
    pub host: String,
    /// Server port.
    #[arg(long, short = 'p', env = "WIREMSG_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Message kind code.
    #[arg(long, short = 'k')]
    pub kind: u32,
    /// Raw string body.
    #[arg(long)]
    pub data: Option<String>,
    /// Wait for one reply and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the handshake and, with --wait, the reply
    /// (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub wait_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show build and wire details.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `150ms`, `2s` or a bare number of seconds.
///
/// Zero is accepted only when `allow_zero` is set.
pub fn parse_duration(input: &str, allow_zero: bool) -> CliResult<std::time::Duration> {
    use std::time::Duration;

    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 && !allow_zero {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
