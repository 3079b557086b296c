//! Stats command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use chrono::{Duration, Utc};

/// Run the stats command.
pub async fn run_stats(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let now = Utc::now();

    let index = orchestrator
        .vector_store()
        .stats(now - Duration::hours(24))
        .await?;
    let cache = orchestrator.cache().stats(now).await?;

    Output::header("Index");
    Output::kv("Videos", &index.total_videos.to_string());
    Output::kv("Chunks", &index.total_chunks.to_string());
    Output::kv("Embedded chunks", &index.embedded_chunks.to_string());
    Output::kv(
        "Chunks per video",
        &format!("{:.1}", index.avg_chunks_per_video),
    );
    Output::kv("Indexed in last 24h", &index.recently_processed.to_string());

    if index.total_chunks == 0 {
        println!();
        Output::warning("No transcript chunks indexed. Run 'blox-wizard ingest <file>' first.");
    }

    println!();
    Output::header("Question Cache");
    Output::kv("Questions", &cache.questions.to_string());
    Output::kv("Expired", &cache.expired.to_string());
    Output::kv("Total uses", &cache.total_usage.to_string());

    Ok(())
}
