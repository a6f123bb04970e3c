use std::io;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use devpath_engine::catalog::Catalog;
use devpath_engine::cli::{self, Cli, Command, Profile};
use devpath_engine::milestone::BusinessMetrics;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Cli::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(io::stderr)
        .init();

    let config = cli::load_config(args.config.as_deref())?;
    let mut stdout = io::stdout();

    match args.command {
        Command::Tier { mrr, team, customers, funding } => {
            let metrics = BusinessMetrics {
                monthly_recurring_revenue: mrr,
                team_size: team,
                customer_count: customers,
                funding_stage: funding,
            };
            cli::run_tier(&config, &metrics, &mut stdout)?;
        }
        Command::Recommend { catalog, profile, limit, json } => {
            let catalog = Catalog::load(&catalog)?;
            let profile = Profile::load(&profile)?;
            let list = cli::run_recommend(&config, catalog, profile, limit).await;
            cli::write_recommendations(&mut stdout, &list, json)?;
        }
        Command::Completions { shell } => {
            cli::write_completions(shell, &mut stdout);
        }
    }
    Ok(())
}
