//! Batch crawling: URL sources, batch files, retries, checkpoints and the
//! worker pool that ties them together.

pub mod batches;
pub mod checkpoint;
pub mod crawler;
pub mod input;
pub mod retry;
pub mod runner;
pub mod status;

pub use checkpoint::CheckpointStore;
pub use crawler::BatchCrawler;
pub use retry::{Backoff, RetryPolicy};
