pub mod types;
pub mod cache;
pub mod config;
pub mod traits;
pub mod sources;
pub mod fetcher;
pub mod normalizer;
pub mod orchestrator;
pub mod merge;
pub mod filter;
pub mod pagination;
pub mod engine;
pub mod export;

pub use types::*;
pub use cache::{CacheStats, TtlLruCache};
pub use config::{EngineConfig, SourceConfig};
pub use traits::PageSource;
pub use sources::HttpPageSource;
pub use fetcher::Fetcher;
pub use normalizer::Normalizer;
pub use orchestrator::{FetchAllOutcome, FetchOrchestrator, SourceOutcome};
pub use merge::{MergeEngine, SourcePriority};
pub use filter::FilterEngine;
pub use pagination::PaginationController;
pub use engine::{FeedEngine, FeedView, LoadOutcome, LoadReport};
pub use export::{write_csv, write_jsonl};
