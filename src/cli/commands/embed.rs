//! Embedding backfill command.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the embed command.
pub async fn run_embed(limit: Option<usize>, settings: Settings) -> Result<()> {
    preflight::check(Operation::Ingest, &settings)?;
    let orchestrator = Orchestrator::new(settings)?;

    let spinner = Output::spinner("Embedding missing chunks...");
    let report = orchestrator.embed_missing(limit).await;
    spinner.finish_and_clear();
    let report = report?;

    if report.pending == 0 {
        Output::success("Every chunk is embedded.");
        return Ok(());
    }

    Output::success(&format!(
        "Embedded {} of {} chunks",
        report.embedded, report.pending
    ));
    for failure in &report.failures {
        Output::list_item(&format!(
            "{} chunk {}: {}",
            failure.video_id, failure.chunk_index, failure.error
        ));
    }

    Ok(())
}
