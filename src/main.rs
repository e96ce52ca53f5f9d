//! sqlsense command-line entry point.

mod cli;

use cli::{Cli, Command};
use sqlsense::config::Config;
use sqlsense::error::Result;
use sqlsense::service::QueryService;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    sqlsense::logging::init_stderr_logging();

    if let Err(e) = run().await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse_args();

    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let config = Config::load_from_file(&config_path)?;

    let service = QueryService::with_default_model(config);

    match &cli.command {
        Command::Validate { connection_string } => {
            let metadata = service.validate_connection(connection_string).await?;
            println!(
                "Connection OK: {} tables, {} rows total",
                metadata.schema.len(),
                metadata.stats.values().map(|s| s.row_count).sum::<u64>()
            );
        }
        Command::Metadata { connection_string } => {
            let metadata = service.validate_connection(connection_string).await?;
            println!("{}", serde_json::to_string_pretty(&*metadata)?);
        }
        Command::Run {
            connection_string,
            sql,
            show_log,
        } => {
            // Validation builds the caches the patcher corrects against.
            service.validate_connection(connection_string).await?;
            let outcome = service.run_query(connection_string, sql).await?;

            info!(
                "Returned {} rows in {:?}",
                outcome.result.row_count(),
                outcome.duration
            );
            println!("{}", serde_json::to_string_pretty(&outcome.result.rows_as_json())?);

            if *show_log {
                for entry in service.query_log() {
                    eprintln!(
                        "[{}x, {:?}] {}",
                        entry.frequency, entry.total_duration, entry.statement
                    );
                }
            }
        }
    }

    service.shutdown().await;
    Ok(())
}
