mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;

use crate::cmd::Command;
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "wiremsg", version, about = "Framed TCP messaging CLI")]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr).
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cmd::run(cli.command, format);

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_subcommand() {
        let cli = Cli::try_parse_from([
            "wiremsg", "send", "--port", "6000", "--kind", "2", "--data", "hello",
        ])
        .expect("send args should parse");

        let Command::Send(args) = cli.command else {
            panic!("expected send");
        };
        assert_eq!(args.port, 6000);
        assert_eq!(args.kind, 2);
        assert_eq!(args.data.as_deref(), Some("hello"));
        assert!(!args.wait);
    }

    #[test]
    fn send_requires_a_kind() {
        let err = Cli::try_parse_from(["wiremsg", "send", "--data", "hello"])
            .expect_err("missing --kind should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn serve_defaults_to_demo_port() {
        let cli = Cli::try_parse_from(["wiremsg", "serve"]).expect("serve args should parse");
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        if std::env::var_os("WIREMSG_PORT").is_none() {
            assert_eq!(args.port, cmd::DEFAULT_PORT);
        }
    }

    #[test]
    fn parses_robot_subcommand() {
        let cli = Cli::try_parse_from([
            "wiremsg",
            "--log-level",
            "debug",
            "robot",
            "--host",
            "localhost",
            "--step-delay",
            "0s",
            "--max-steps",
            "10",
        ])
        .expect("robot args should parse");

        let Command::Robot(args) = cli.command else {
            panic!("expected robot");
        };
        assert_eq!(args.host, "localhost");
        assert_eq!(args.max_steps, Some(10));
    }

    #[test]
    fn rejects_unknown_format() {
        let err = Cli::try_parse_from(["wiremsg", "--format", "xml", "version"])
            .expect_err("unknown format should fail");
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidValue);
    }
}
