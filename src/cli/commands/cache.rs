//! Question cache maintenance commands.

use crate::cache::normalize_question;
use crate::cli::{CacheAction, Output};
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use anyhow::Result;
use chrono::Utc;

/// Run a cache subcommand.
pub async fn run_cache(action: &CacheAction, settings: Settings) -> Result<()> {
    let orchestrator = Orchestrator::new(settings)?;
    let cache = orchestrator.cache();

    match action {
        CacheAction::Stats => {
            let stats = cache.stats(Utc::now()).await?;
            Output::header("Question Cache");
            Output::kv("Questions", &stats.questions.to_string());
            Output::kv("Expired", &stats.expired.to_string());
            Output::kv("Total uses", &stats.total_usage.to_string());
        }
        CacheAction::Clear => {
            let removed = cache.clear().await?;
            Output::success(&format!("Removed {} cached answers", removed));
        }
        CacheAction::Evict { question } => {
            let pattern = normalize_question(question);
            if cache.evict(&pattern).await? {
                Output::success(&format!("Evicted \"{}\"", pattern));
            } else {
                Output::warning(&format!("\"{}\" is not cached", pattern));
            }
        }
        CacheAction::Purge => {
            let removed = cache.purge_expired(Utc::now()).await?;
            Output::success(&format!("Purged {} expired answers", removed));
        }
    }

    Ok(())
}
