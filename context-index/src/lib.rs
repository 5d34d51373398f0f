//! Incremental code indexer and auto-indexing file watcher (spec §4.6,
//! §4.13). Implements the [`context_core::indexing::Indexer`] contract so
//! `context-core` never depends on this crate directly.

pub mod indexer;
pub mod languages;
pub mod parser;
pub mod walker;
pub mod watcher;

pub use indexer::IncrementalIndexer;
pub use parser::{RegexSourceParser, SourceParser};
pub use watcher::{AutoIndexService, WatcherConfig};
