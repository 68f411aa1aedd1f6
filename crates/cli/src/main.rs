use crate::{commands::Commands, env::EnvManager, error::CliError, shutdown::ShutdownCoordinator};
use clap::Parser;
use connectors::sql::pool::MySqlPool;
use engine_core::checkpoint::CheckpointStore;
use engine_core::metrics::Metrics;
use engine_core::settings::Settings;
use engine_runtime::coordinator::Coordinator;
use serde_json::json;
use std::process;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod env;
mod error;
mod shutdown;

#[derive(Parser)]
#[command(name = "tablesync", version, about = "Single-table MySQL CDC replicator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let exit_code = match run_cli().await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!("{e}");
            1
        }
    };

    process::exit(exit_code);
}

async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    let cancel = CancellationToken::new();
    let shutdown = ShutdownCoordinator::new(cancel.clone());
    shutdown.register_handlers();

    match cli.command {
        Commands::Run { env_file } => {
            let settings = load_settings(env_file.as_deref())?;
            let metrics = Metrics::new();
            info!(
                job = settings.table_key(),
                health_port = settings.health_port,
                "starting replication"
            );

            let coordinator = Coordinator::new(settings, metrics, cancel);
            coordinator.run().await?;
            info!("replication stopped");
            Ok(())
        }

        Commands::TestConn { env_file } => {
            let settings = load_settings(env_file.as_deref())?;

            let src = MySqlPool::connect(&settings.src_dsn)?;
            src.ping().await?;
            println!("source: ok");

            let tgt = MySqlPool::connect(&settings.tgt_dsn)?;
            tgt.ping().await?;
            println!("target: ok");

            let _ = src.disconnect().await;
            let _ = tgt.disconnect().await;
            Ok(())
        }

        Commands::Checkpoint { env_file, json } => {
            let settings = load_settings(env_file.as_deref())?;
            let key = settings.table_key();

            let tgt = MySqlPool::connect(&settings.tgt_dsn)?;
            let store = CheckpointStore::new(
                tgt.clone(),
                &settings.target_table.db,
                &settings.checkpoint_table,
            );
            store.ensure().await?;

            let anchor = store.read(&key).await?;
            let ranges = store.done_ranges(&key).await?;

            if json {
                let payload = json!({
                    "table_key": key,
                    "checkpoint": anchor,
                    "done_ranges": ranges,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Job: {key}");
                match anchor {
                    Some(anchor) => println!("Checkpoint: {anchor}"),
                    None => println!("Checkpoint: <none>"),
                }
                println!("Completed full-load ranges: {}", ranges.len());
                for range in ranges {
                    println!("  [{}, {}]", range.start, range.end);
                }
            }

            let _ = tgt.disconnect().await;
            Ok(())
        }
    }
}

fn load_settings(env_file: Option<&str>) -> Result<Settings, CliError> {
    let mut env_manager = EnvManager::new();
    if let Some(path) = env_file {
        info!("Loading environment variables from: {}", path);
        env_manager.load_from_file(path)?;
    }
    Ok(Settings::from_vars(env_manager.all())?)
}
