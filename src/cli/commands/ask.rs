//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::orchestrator::Orchestrator;
use crate::rag::QueryRequest;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(
    question: &str,
    max_results: Option<usize>,
    threshold: Option<f32>,
    json: bool,
    settings: Settings,
) -> Result<()> {
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        return Err(e.into());
    }

    let orchestrator = Orchestrator::new(settings)?;
    let engine = orchestrator.rag_engine()?;

    let request = QueryRequest {
        question: question.to_string(),
        max_results,
        similarity_threshold: threshold,
    };

    let spinner = Output::spinner("Searching tutorials...");
    let result = engine.ask(&request).await;
    spinner.finish_and_clear();

    let response = match result {
        Ok(response) => response,
        Err(e) => {
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("\n{}\n", response.answer);

    if !response.video_references.is_empty() {
        Output::header("Sources");
        for r in &response.video_references {
            Output::search_result(
                &r.title,
                &crate::transcript::format_timestamp(f64::from(r.start_seconds)),
                r.similarity_score,
                &r.matched_excerpt,
                Some(&r.timestamp_url),
            );
        }
    }

    if !response.suggested_questions.is_empty() {
        Output::header("You might also ask");
        for q in &response.suggested_questions {
            Output::list_item(q);
        }
    }

    println!();
    Output::kv("Confidence", &format!("{:.0}%", response.confidence * 100.0));
    if response.cache_hit {
        Output::kv("Cache", "hit");
    }

    Ok(())
}
