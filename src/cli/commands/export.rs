//! Export command implementation.

use crate::chunking::{format_chunks, OutputFormat};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the export command.
pub async fn run_export(
    video_id: &str,
    output: Option<String>,
    format: &str,
    settings: Settings,
) -> Result<()> {
    let output_format: OutputFormat = format.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let orchestrator = Orchestrator::new(settings)?;
    let store = orchestrator.vector_store();

    let Some(video) = store.get_video(video_id).await? else {
        Output::error(&format!("No indexed content found for video ID: {}", video_id));
        Output::info("Use 'blox-wizard list' to see indexed videos.");
        return Ok(());
    };
    let chunks = store.get_chunks(video_id).await?;

    let output_str = format_chunks(&video.metadata, &chunks, output_format)?;

    match output {
        Some(path) if path != "-" => {
            std::fs::write(&path, &output_str)?;
            Output::success(&format!(
                "Exported '{}' to {} ({} chunks)",
                video.metadata.title,
                path,
                chunks.len()
            ));
        }
        _ => {
            println!("{}", output_str);
        }
    }

    Ok(())
}
