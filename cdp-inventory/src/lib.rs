//! Library module for the `cdp-inventory` binary.
//!
//! Exposes the CLI definition and the command implementations so they can be
//! tested without spawning the binary. `main.rs` only parses arguments,
//! initializes logging, and dispatches.

pub mod collect;
pub mod output;
pub mod server;

use cdp_inventory_core::adapters::{AdapterSettings, AggregatorConfig};
use cdp_inventory_core::logging::LogFormat;
use cdp_inventory_core::InventoryAggregator;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// CLI argument structure
#[derive(Debug, Parser)]
#[command(name = "cdp-inventory")]
#[command(about = "Field completeness inventory for customer data platforms")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = "
CDP Inventory - field completeness across Salesforce, HubSpot and Google Analytics

Reads a request describing a user's platform connections, authenticates to
each platform, and reports how many records populate each field.

SECURITY FEATURES:
- Read-only platform calls
- Credentials are never logged or written to output
- Request files may reference secrets as env:VARIABLE

EXAMPLES:
  cdp-inventory collect --request request.json --output inventory.json
  cat request.json | cdp-inventory collect
  cdp-inventory serve --bind 0.0.0.0:8080
  cdp-inventory list
")]
pub struct Cli {
    /// Flags shared by every command
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run one inventory request and write the response
    Collect(CollectArgs),
    /// Serve inventory requests over HTTP
    Serve(ServeArgs),
    /// List supported platforms and the credential fields they expect
    List,
}

/// Arguments for `collect`
#[derive(Debug, Args)]
pub struct CollectArgs {
    /// Request file; `-` reads standard input
    #[arg(long, short, value_name = "FILE", default_value = "-")]
    pub request: PathBuf,

    /// Output file; standard output when omitted
    #[arg(long, short, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write single-line JSON instead of pretty-printed output
    #[arg(long)]
    pub compact: bool,
}

/// Arguments for `serve`
#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "CDP_INVENTORY_BIND", default_value = "127.0.0.1:8080")]
    pub bind: SocketAddr,
}

/// Log line format flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable lines
    #[default]
    Text,
    /// JSON lines
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => Self::Text,
            LogFormatArg::Json => Self::Json,
        }
    }
}

/// Flags shared by every command
#[derive(Debug, Args)]
pub struct GlobalArgs {
    /// Increase verbosity
    #[arg(
        short,
        long,
        global = true,
        action = clap::ArgAction::Count,
        help = "Increase verbosity (-v, -vv)"
    )]
    pub verbose: u8,

    /// Suppress output
    #[arg(short, long, global = true, help = "Suppress all logs except errors")]
    pub quiet: bool,

    /// Log line format
    #[arg(
        long,
        global = true,
        value_enum,
        env = "CDP_INVENTORY_LOG_FORMAT",
        default_value_t = LogFormatArg::Text
    )]
    pub log_format: LogFormatArg,

    /// Deadline for one connection's pipeline, in seconds
    #[arg(
        long,
        global = true,
        env = "CDP_INVENTORY_TIMEOUT",
        default_value_t = 120,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub timeout: u64,

    /// Deadline for a single platform HTTP call, in seconds
    #[arg(
        long,
        global = true,
        env = "CDP_INVENTORY_REQUEST_TIMEOUT",
        default_value_t = 60,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub request_timeout: u64,

    /// Connections inventoried at once
    #[arg(
        long,
        global = true,
        env = "CDP_INVENTORY_MAX_CONCURRENCY",
        default_value_t = 8,
        value_parser = clap::value_parser!(u16).range(1..)
    )]
    pub max_concurrency: u16,

    /// Per-field queries in flight within one connection (1-16)
    #[arg(
        long,
        global = true,
        env = "CDP_INVENTORY_FIELD_CONCURRENCY",
        default_value_t = 4,
        value_parser = clap::value_parser!(u8).range(1..=16)
    )]
    pub field_concurrency: u8,
}

impl GlobalArgs {
    /// Scheduling configuration for the aggregator.
    pub fn aggregator_config(&self) -> AggregatorConfig {
        AggregatorConfig::new()
            .with_pipeline_timeout(Duration::from_secs(self.timeout))
            .with_max_concurrency(usize::from(self.max_concurrency))
    }

    /// HTTP settings for platform adapters.
    pub fn adapter_settings(&self) -> AdapterSettings {
        AdapterSettings::default()
            .with_request_timeout(Duration::from_secs(self.request_timeout))
            .with_field_concurrency(usize::from(self.field_concurrency))
    }

    /// Builds an aggregator with every built-in platform registered.
    ///
    /// # Errors
    /// Returns `InventoryError::Configuration` when the settings are invalid.
    pub fn build_aggregator(&self) -> cdp_inventory_core::Result<InventoryAggregator> {
        let settings = self.adapter_settings();
        settings.validate()?;
        let config = self.aggregator_config();
        config.validate()?;
        Ok(InventoryAggregator::with_default_platforms(settings, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_collect_defaults_to_stdin() {
        let cli = Cli::try_parse_from(["cdp-inventory", "collect"]).unwrap();
        match cli.command {
            Command::Collect(args) => {
                assert_eq!(args.request, PathBuf::from("-"));
                assert!(args.output.is_none());
                assert!(!args.compact);
            }
            other => panic!("expected collect, got {other:?}"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "cdp-inventory",
            "collect",
            "--request",
            "request.json",
            "-vv",
            "--log-format",
            "json",
            "--timeout",
            "30",
            "--max-concurrency",
            "2",
        ])
        .unwrap();

        assert_eq!(cli.global.verbose, 2);
        assert_eq!(cli.global.log_format, LogFormatArg::Json);

        let config = cli.global.aggregator_config();
        assert_eq!(config.pipeline_timeout, Duration::from_secs(30));
        assert_eq!(config.max_concurrency, 2);
    }

    #[test]
    fn test_zero_values_rejected() {
        assert!(Cli::try_parse_from(["cdp-inventory", "list", "--timeout", "0"]).is_err());
        assert!(Cli::try_parse_from(["cdp-inventory", "list", "--max-concurrency", "0"]).is_err());
    }

    #[test]
    fn test_field_concurrency_out_of_range_rejected() {
        for value in ["0", "17", "99"] {
            assert!(
                Cli::try_parse_from(["cdp-inventory", "list", "--field-concurrency", value]).is_err(),
                "{value}"
            );
        }
        let cli = Cli::try_parse_from(["cdp-inventory", "list", "--field-concurrency", "16"]).unwrap();
        assert_eq!(cli.global.field_concurrency, 16);
    }

    #[test]
    fn test_env_fallbacks() {
        temp_env::with_vars(
            [
                ("CDP_INVENTORY_TIMEOUT", Some("45")),
                ("CDP_INVENTORY_BIND", Some("0.0.0.0:9090")),
            ],
            || {
                let cli = Cli::try_parse_from(["cdp-inventory", "serve"]).unwrap();
                assert_eq!(cli.global.timeout, 45);
                match cli.command {
                    Command::Serve(args) => assert_eq!(args.bind.port(), 9090),
                    other => panic!("expected serve, got {other:?}"),
                }
            },
        );
    }

    #[test]
    fn test_build_aggregator_uses_flags() {
        let cli = Cli::try_parse_from(["cdp-inventory", "list", "--field-concurrency", "2"]).unwrap();
        let aggregator = cli.global.build_aggregator().unwrap();
        assert_eq!(aggregator.registry().settings().field_concurrency, 2);
        assert!(aggregator.registry().is_registered("Salesforce"));
    }
}
