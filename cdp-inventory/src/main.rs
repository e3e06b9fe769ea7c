//! CDP inventory collection tool.
//!
//! Collects per-field completeness from Salesforce, HubSpot and Google
//! Analytics for the connections described in a request, either once from
//! the command line or as an HTTP service.
//!
//! # Security Guarantees
//! - Read-only platform operations only
//! - No credentials stored or logged
//! - Output is validated and scanned for secrets before it is written

use anyhow::Result;
use cdp_inventory::{Cli, Command, collect, server};
use cdp_inventory_core::logging::init_logging;
use cdp_inventory_core::validation::initialize_output_validator;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(
        cli.global.verbose,
        cli.global.quiet,
        cli.global.log_format.into(),
    )?;

    // Compile the output schema up front so a broken build fails before any platform call
    initialize_output_validator()?;

    let aggregator = cli.global.build_aggregator()?;

    match &cli.command {
        Command::Collect(args) => collect::run_collect(args, &aggregator).await,
        Command::Serve(args) => {
            server::serve(args.bind, server::AppState::new(aggregator)).await
        }
        Command::List => {
            let platforms = collect::list_platforms(aggregator.registry()).await?;
            print!("{}", collect::render_platform_list(&platforms));
            Ok(())
        }
    }
}
