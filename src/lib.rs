//! Blox Wizard - retrieval-augmented answers from tutorial video transcripts
//!
//! Turns timed video transcripts into a searchable knowledge base and answers
//! questions with links to the exact moment in each video.
//!
//! # Overview
//!
//! - Validate raw transcript segments and split them into 30-second chunks
//! - Embed chunks and questions into a shared vector space
//! - Rank chunks by cosine similarity against a question
//! - Compose an answer with timestamped video references and follow-up questions
//! - Memoize answers per normalized question
//!
//! # Architecture
//!
//! - `transcript` - Transcript models and segment normalization
//! - `chunking` - Fixed-window chunking and chunk export
//! - `embedding` - Embedding generation, retries and rate limiting
//! - `vector_store` - Vector database abstraction
//! - `rag` - Answer synthesis and the read path
//! - `cache` - Question cache
//! - `orchestrator` - Write path coordination
//! - `config` - Configuration management
//!
//! # Example
//!
//! ```rust,no_run
//! use blox_wizard::config::Settings;
//! use blox_wizard::orchestrator::Orchestrator;
//! use blox_wizard::rag::QueryRequest;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::new(settings)?;
//!
//!     let engine = orchestrator.rag_engine()?;
//!     let response = engine.ask(&QueryRequest::new("How do I use TweenService?")).await?;
//!     println!("{}", response.format_for_display());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod openai;
pub mod orchestrator;
pub mod rag;
pub mod transcript;
pub mod vector_store;

pub use error::{Result, WizardError};
