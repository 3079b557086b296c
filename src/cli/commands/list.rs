//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    match orchestrator.vector_store().list_videos().await {
        Ok(videos) => {
            if videos.is_empty() {
                Output::info("No videos indexed yet. Use 'blox-wizard ingest <file>' to add transcripts.");
            } else {
                Output::header(&format!("Indexed Videos ({})", videos.len()));
                println!();

                for video in &videos {
                    Output::video_info(
                        &video.metadata.title,
                        &video.metadata.video_id,
                        &video.metadata.creator,
                        video.chunk_count,
                        video.embedded_count,
                        video.metadata.duration_seconds,
                    );
                }

                let total_chunks: u32 = videos.iter().map(|v| v.chunk_count).sum();
                let embedded: u32 = videos.iter().map(|v| v.embedded_count).sum();
                println!();
                Output::kv("Total videos", &videos.len().to_string());
                Output::kv("Total chunks", &total_chunks.to_string());
                if embedded < total_chunks {
                    Output::warning(&format!(
                        "{} chunks are not embedded yet. Run 'blox-wizard embed' to backfill.",
                        total_chunks - embedded
                    ));
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to list videos: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
