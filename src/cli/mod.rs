//! CLI module for Blox Wizard.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// Blox Wizard - answers Roblox questions from tutorial video transcripts
///
/// Ingests timed transcripts, indexes them as embedded chunks, and answers
/// questions with links to the exact moment in each video.
#[derive(Parser, Debug)]
#[command(name = "blox-wizard")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ingest transcripts from a JSON file (one video object or an array)
    Ingest {
        /// Path to the JSON file ("-" reads stdin)
        file: String,
    },

    /// Ask a question and get an answer with video references
    Ask {
        /// The question to ask
        question: String,

        /// Maximum number of chunks to retrieve
        #[arg(short = 'n', long)]
        max_results: Option<usize>,

        /// Minimum similarity score
        #[arg(short, long)]
        threshold: Option<f32>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// Search for relevant transcript chunks
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long)]
        limit: Option<usize>,

        /// Minimum similarity score
        #[arg(short, long)]
        min_score: Option<f32>,

        /// Most results taken from any one video
        #[arg(short, long)]
        per_video: Option<usize>,
    },

    /// List indexed videos
    List,

    /// Show index and cache totals
    Stats,

    /// Rechunk stored transcripts with the current window
    Rechunk {
        /// Video ID to rechunk (use 'all' to rechunk everything)
        video_id: String,
    },

    /// Embed chunks that are still missing an embedding
    Embed {
        /// Maximum number of chunks to embed
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Check that stored transcripts are still usable
    Verify,

    /// Export the indexed chunks of a video
    Export {
        /// Video ID to export
        video_id: String,

        /// Output file (stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,

        /// Output format (json, srt, vtt)
        #[arg(long, default_value = "json")]
        format: String,
    },

    /// Remove a video and its chunks from the index
    Delete {
        /// Video ID to delete
        video_id: String,
    },

    /// Manage the question cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Start HTTP API server
    Serve {
        /// Host to bind to (defaults to server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to (defaults to server.port)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// Show cache counters
    Stats,

    /// Remove every cached answer
    Clear,

    /// Remove the cached answer for one question
    Evict {
        /// The question, as it was asked
        question: String,
    },

    /// Remove expired answers
    Purge,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Open configuration file in editor
    Edit,

    /// Show configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask() {
        let cli = Cli::try_parse_from([
            "blox-wizard",
            "-vv",
            "ask",
            "How do I tween?",
            "-n",
            "3",
            "--threshold",
            "0.05",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Ask {
                question,
                max_results,
                threshold,
                json,
            } => {
                assert_eq!(question, "How do I tween?");
                assert_eq!(max_results, Some(3));
                assert_eq!(threshold, Some(0.05));
                assert!(!json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_cache_evict() {
        let cli = Cli::try_parse_from(["blox-wizard", "cache", "evict", "how do i jump"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Evict { .. }
            }
        ));
    }

    #[test]
    fn test_parse_search_per_video() {
        let cli = Cli::try_parse_from(["blox-wizard", "search", "tween", "-l", "8", "--per-video", "2"])
            .unwrap();
        match cli.command {
            Commands::Search {
                query,
                limit,
                min_score,
                per_video,
            } => {
                assert_eq!(query, "tween");
                assert_eq!(limit, Some(8));
                assert!(min_score.is_none());
                assert_eq!(per_video, Some(2));
            }
            other => panic!("unexpected command: {:?}", other),
        }

        let cli = Cli::try_parse_from(["blox-wizard", "stats"]).unwrap();
        assert!(matches!(cli.command, Commands::Stats));
    }
}
