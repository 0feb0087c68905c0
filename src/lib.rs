pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod merge;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod scrapers;

pub use config::CrawlerConfig;
pub use error::{CrawlError, InputError};
pub use models::{ContactRecord, CrawlStats, Listing};
