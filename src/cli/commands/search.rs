//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::rag::VideoLinks;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    query: &str,
    limit: Option<usize>,
    min_score: Option<f32>,
    per_video: Option<usize>,
    settings: Settings,
) -> Result<()> {
    preflight::check(Operation::Search, &settings)?;

    let limit = limit.unwrap_or(settings.search.max_results);
    let min_score = min_score.unwrap_or(settings.search.similarity_threshold);
    let links = VideoLinks::new(&settings.links.watch_base_url)?;

    let orchestrator = Orchestrator::new(settings)?;
    let engine = orchestrator.rag_engine()?;

    let spinner = Output::spinner("Searching...");
    let results = engine.search(query, limit, min_score, per_video).await;
    spinner.finish_and_clear();

    match results {
        Ok(results) if results.is_empty() => {
            Output::warning("No results found matching your query.");
        }
        Ok(results) => {
            Output::success(&format!("Found {} results", results.len()));
            for r in &results {
                let url = links.timestamp_url(&r.external_id, r.chunk.start_seconds.max(0.0) as u32);
                Output::search_result(
                    &r.title,
                    &r.format_timestamp(),
                    r.similarity_score,
                    &r.chunk.text,
                    Some(&url),
                );
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
