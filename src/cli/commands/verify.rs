//! Stored transcript verification command.

use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;

/// Run the verify command.
pub async fn run_verify(settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let report = orchestrator.verify().await?;

    if report.is_empty() {
        Output::info("No stored transcripts.");
        return Ok(());
    }

    Output::header(&format!("Stored Transcripts ({})", report.len()));
    println!();

    for health in &report {
        if health.is_usable() {
            Output::list_item(&format!(
                "{} ({}): usable, {} segments",
                health.title, health.video_id, health.segments
            ));
        } else {
            let detail = health.detail.as_deref().unwrap_or("");
            Output::warning(&format!(
                "{} ({}): {} {}",
                health.title, health.video_id, health.status, detail
            ));
        }
    }

    let usable = report.iter().filter(|h| h.is_usable()).count();
    println!();
    Output::kv("Usable", &format!("{}/{}", usable, report.len()));

    Ok(())
}
