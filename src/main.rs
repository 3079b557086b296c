//! Blox Wizard CLI entry point.

use anyhow::Result;
use blox_wizard::cli::{commands, Cli, Commands};
use blox_wizard::config::Settings;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = match &cli.config {
        Some(path) => Settings::load_from(Some(&std::path::PathBuf::from(path)))?,
        None => Settings::load()?,
    };

    // -v flags win over the configured level
    let log_level = match cli.verbose {
        0 => settings.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("blox_wizard={}", log_level)),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    std::fs::create_dir_all(settings.data_dir())?;

    match &cli.command {
        Commands::Ingest { file } => {
            commands::run_ingest(file, settings).await?;
        }

        Commands::Ask {
            question,
            max_results,
            threshold,
            json,
        } => {
            commands::run_ask(question, *max_results, *threshold, *json, settings).await?;
        }

        Commands::Search {
            query,
            limit,
            min_score,
            per_video,
        } => {
            commands::run_search(query, *limit, *min_score, *per_video, settings).await?;
        }

        Commands::List => {
            commands::run_list(settings).await?;
        }

        Commands::Stats => {
            commands::run_stats(settings).await?;
        }

        Commands::Rechunk { video_id } => {
            commands::run_rechunk(video_id, settings).await?;
        }

        Commands::Embed { limit } => {
            commands::run_embed(*limit, settings).await?;
        }

        Commands::Verify => {
            commands::run_verify(settings).await?;
        }

        Commands::Export {
            video_id,
            output,
            format,
        } => {
            commands::run_export(video_id, output.clone(), format, settings).await?;
        }

        Commands::Delete { video_id } => {
            commands::run_delete(video_id, settings).await?;
        }

        Commands::Cache { action } => {
            commands::run_cache(action, settings).await?;
        }

        Commands::Serve { host, port } => {
            commands::run_serve(host.clone(), *port, settings).await?;
        }

        Commands::Config { action } => {
            commands::run_config(action, cli.config.as_deref(), settings)?;
        }
    }

    Ok(())
}
