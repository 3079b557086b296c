//! Rechunk command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the rechunk command.
pub async fn run_rechunk(video_id: &str, settings: Settings) -> Result<()> {
    preflight::check(Operation::Ingest, &settings)?;
    let orchestrator = Orchestrator::new(settings)?;

    if video_id == "all" {
        let spinner = Output::spinner("Rechunking all stored transcripts...");
        let outcomes = orchestrator.rechunk_all().await;
        spinner.finish_and_clear();
        let outcomes = outcomes?;

        if outcomes.is_empty() {
            Output::warning("No stored transcripts found.");
            return Ok(());
        }

        let mut success_count = 0;
        let mut error_count = 0;
        for outcome in &outcomes {
            match &outcome.result {
                Ok(report) => {
                    Output::success(&format!(
                        "{}: {} chunks",
                        report.title, report.chunks_created
                    ));
                    success_count += 1;
                }
                Err(e) => {
                    Output::error(&format!("{}: {}", outcome.video_id, e));
                    error_count += 1;
                }
            }
        }

        println!();
        Output::info(&format!(
            "Rechunking complete: {} succeeded, {} failed",
            success_count, error_count
        ));
    } else {
        Output::info(&format!("Rechunking video: {}", video_id));

        let spinner = Output::spinner("Rechunking...");
        let result = orchestrator.rechunk(video_id).await;
        spinner.finish_and_clear();

        match result {
            Ok(report) => {
                Output::success(&format!(
                    "Successfully rechunked '{}' ({} chunks)",
                    report.title, report.chunks_created
                ));
            }
            Err(e) => {
                Output::error(&format!("Failed to rechunk: {}", e));
                return Err(e.into());
            }
        }
    }

    Ok(())
}
