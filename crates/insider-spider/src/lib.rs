//! Insider-trade scraping, price download and forward returns.
//!
//! The three jobs share one retrieval pipeline: units of work are fetched
//! concurrently through a cached, retrying http layer, parsed, filtered and
//! written once every unit has finished.

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod fs;
pub mod logging;
pub mod pipeline;
pub mod retry;
pub mod returns;
pub mod writer;

/// Insider trade filings.
pub mod insider;

/// Stock price histories.
pub mod stock;

pub(crate) mod tui;

pub use config::Config;
pub use error::Error;
pub use pipeline::{Pipeline, Summary};

/// Shortcut for required API elements.
pub(crate) mod http {
    pub(crate) use dotenv::var;
    pub(crate) use reqwest::Client as HttpClient;
}

/// `"elapsed time: 1.234s"`, for the end of a log line.
pub(crate) fn time_elapsed(time: std::time::Instant) -> String {
    format!("elapsed time: {:.3?}", time.elapsed())
}
