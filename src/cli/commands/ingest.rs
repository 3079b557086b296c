//! Ingest command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::{IngestReport, Orchestrator};
use crate::transcript::RawVideo;
use anyhow::{Context, Result};
use std::io::Read;

/// Run the ingest command.
pub async fn run_ingest(file: &str, settings: Settings) -> Result<()> {
    preflight::check(Operation::Ingest, &settings)?;

    let text = if file == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(file).with_context(|| format!("Failed to read {}", file))?
    };

    let videos = RawVideo::parse_many(&text)?;
    if videos.is_empty() {
        Output::warning("No videos in input.");
        return Ok(());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let total = videos.len();

    let spinner = Output::spinner(&format!("Ingesting {} video(s)...", total));
    let mut outcomes = orchestrator.ingest_batch(videos).await;
    spinner.finish_and_clear();
    outcomes.sort_by(|a, b| a.video_id.cmp(&b.video_id));

    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.result {
            Ok(report) => print_report(report),
            Err(e) => {
                Output::error(&format!("{}: {}", outcome.video_id, e));
                failed += 1;
            }
        }
    }

    println!();
    Output::info(&format!(
        "Ingest complete: {} succeeded, {} failed",
        total - failed,
        failed
    ));

    if failed == total {
        anyhow::bail!("No videos were ingested");
    }
    Ok(())
}

fn print_report(report: &IngestReport) {
    if report.is_complete() {
        Output::success(&format!(
            "{} ({}): {} chunks",
            report.title, report.video_id, report.chunks_created
        ));
        return;
    }

    Output::warning(&format!(
        "{} ({}): {} chunks, {} without embeddings",
        report.title,
        report.video_id,
        report.chunks_created,
        report.failures.len()
    ));
    for failure in &report.failures {
        Output::list_item(&format!("chunk {}: {}", failure.chunk_index, failure.error));
    }
    Output::info("Run 'blox-wizard embed' later to retry the missing embeddings.");
}
