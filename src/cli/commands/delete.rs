//! Delete command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the delete command.
pub async fn run_delete(video_id: &str, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;

    if orchestrator.delete(video_id).await? {
        Output::success(&format!("Deleted {}", video_id));
    } else {
        Output::warning(&format!("No indexed video with ID {}", video_id));
    }
    Ok(())
}
