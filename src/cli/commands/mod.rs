//! CLI command implementations.

mod ask;
mod cache;
mod config;
mod delete;
mod embed;
mod export;
mod ingest;
mod list;
mod rechunk;
mod search;
mod serve;
mod stats;
mod verify;

pub use ask::run_ask;
pub use cache::run_cache;
pub use config::run_config;
pub use delete::run_delete;
pub use embed::run_embed;
pub use export::run_export;
pub use ingest::run_ingest;
pub use list::run_list;
pub use rechunk::run_rechunk;
pub use search::run_search;
pub use serve::run_serve;
pub use stats::run_stats;
pub use verify::run_verify;
