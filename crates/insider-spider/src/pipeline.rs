//! Bounded fan-out over independent units of work.
//!
//! Each [`Unit`] is one request (a month of trades, a ticker's price
//! history). For every unit the pipeline checks the cache, fetches on a miss
//! (with retry), extracts records, caches the payload once it parses, filters
//! the records and appends them to a shared batch. Units run concurrently up to
//! `max_workers`; one unit failing never stops the others. [`Pipeline::run`]
//! returns once every unit has finished, so callers write only after the
//! join.

use crate::cache::{CacheKey, FileCache};
use crate::config::Config;
use crate::error::{ParseError, UnitError};
use crate::fetch::{Fetch, ReqwestFetcher};
use crate::retry::{fetch_with_retry, RetryPolicy};
use crate::tui::BatchProgress;
use futures::{stream, StreamExt};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, trace, warn};

/// One independently fetchable piece of work.
pub trait Unit: Send + Sync {
    type Record: Send;

    /// Human readable name, also the cache file name.
    fn label(&self) -> String;

    fn url(&self) -> String;

    fn cache_key(&self) -> CacheKey {
        CacheKey::new(self.label(), self.url())
    }

    /// Parse a payload. A payload that cannot be read at all is an `Err`;
    /// individual bad rows belong in [`Extracted::skipped`].
    fn extract(&self, payload: &str) -> Result<Extracted<Self::Record>, ParseError>;

    fn keep(&self, _record: &Self::Record) -> bool {
        true
    }
}

/// Records parsed from one payload, plus the rows that had to be dropped.
#[derive(Debug)]
pub struct Extracted<T> {
    pub records: Vec<T>,
    pub skipped: Vec<ParseError>,
}

impl<T> Extracted<T> {
    pub fn new(records: Vec<T>) -> Self {
        Self {
            records,
            skipped: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct UnitFailure {
    pub label: String,
    pub error: UnitError,
}

/// Everything a run produced.
#[derive(Debug)]
pub struct Batch<T> {
    pub records: Vec<T>,
    pub succeeded: usize,
    pub failures: Vec<UnitFailure>,
    /// Malformed rows dropped across all units.
    pub skipped: usize,
    /// Well-formed rows rejected by [`Unit::keep`].
    pub filtered: usize,
    pub cache_hits: usize,
}

impl<T> Default for Batch<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            succeeded: 0,
            failures: Vec::new(),
            skipped: 0,
            filtered: 0,
            cache_hits: 0,
        }
    }
}

impl<T> Batch<T> {
    pub fn summary(&self, output: PathBuf) -> Summary {
        Summary {
            output,
            written: self.records.len(),
            succeeded: self.succeeded,
            failed: self.failures.len(),
            skipped: self.skipped,
            filtered: self.filtered,
            cache_hits: self.cache_hits,
        }
    }
}

/// What a finished run reports back to the caller.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    /// File (or directory) the records were written to.
    pub output: PathBuf,
    pub written: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub filtered: usize,
    pub cache_hits: usize,
}

struct Outcome<T> {
    records: Vec<T>,
    skipped: usize,
    filtered: usize,
    cache_hit: bool,
}

#[derive(Clone)]
pub struct Pipeline {
    fetcher: Arc<dyn Fetch>,
    cache: FileCache,
    retry: RetryPolicy,
    max_workers: usize,
    tui: bool,
}

impl Pipeline {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        cache: FileCache,
        retry: RetryPolicy,
        max_workers: usize,
    ) -> Self {
        Self {
            fetcher,
            cache,
            retry,
            max_workers: max_workers.max(1),
            tui: false,
        }
    }

    /// reqwest transport, file cache and retry policy as configured.
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let fetcher = ReqwestFetcher::new(config.scraping.timeout())?;
        Ok(Self::new(
            Arc::new(fetcher),
            FileCache::from_config(&config.cache),
            RetryPolicy::from_config(&config.scraping),
            config.scraping.workers(),
        ))
    }

    /// Show progress bars while running.
    pub fn with_tui(mut self, tui: bool) -> Self {
        self.tui = tui;
        self
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub async fn run<U: Unit>(&self, units: Vec<U>, msg: &str) -> Batch<U::Record> {
        let time = std::time::Instant::now();
        let progress = BatchProgress::new(units.len(), msg, self.tui);
        let batch: Mutex<Batch<U::Record>> = Mutex::new(Batch::default());

        info!(
            "{msg}: {} units across {} workers ...",
            units.len(),
            self.max_workers
        );
        stream::iter(units)
            .for_each_concurrent(self.max_workers, |unit| {
                let batch = &batch;
                let progress = &progress;
                async move {
                    let label = unit.label();
                    match self.process(&unit).await {
                        Ok(outcome) => {
                            debug!(
                                "[{label}] {} records kept, {} filtered, {} skipped",
                                outcome.records.len(),
                                outcome.filtered,
                                outcome.skipped
                            );
                            let mut batch = batch.lock().await;
                            batch.records.extend(outcome.records);
                            batch.succeeded += 1;
                            batch.skipped += outcome.skipped;
                            batch.filtered += outcome.filtered;
                            batch.cache_hits += usize::from(outcome.cache_hit);
                            progress.succeeded();
                        }
                        Err(err) => {
                            error!("failed to process [{label}], error({err})");
                            batch.lock().await.failures.push(UnitFailure { label, error: err });
                            progress.failed();
                        }
                    }
                }
            })
            .await;
        progress.finish();

        let batch = batch.into_inner();
        info!(
            "{msg}: {} succeeded, {} failed, {} records, {} cache hits. {}",
            batch.succeeded,
            batch.failures.len(),
            batch.records.len(),
            batch.cache_hits,
            crate::time_elapsed(time)
        );
        batch
    }

    async fn process<U: Unit>(&self, unit: &U) -> Result<Outcome<U::Record>, UnitError> {
        let key = unit.cache_key();

        let (payload, cache_hit) = match self.cache.get(&key).await {
            Some(payload) => (payload, true),
            None => {
                let url = unit.url();
                let payload = fetch_with_retry(self.fetcher.as_ref(), &self.retry, &url).await?;
                (payload, false)
            }
        };

        let extracted = unit.extract(&payload)?;
        // only payloads that parse are cached
        if !cache_hit {
            if let Err(err) = self.cache.put(&key, &payload).await {
                warn!("failed to cache [{}], error({err})", unit.label());
            }
        }
        for err in &extracted.skipped {
            warn!("skipping malformed row in [{}], error({err})", unit.label());
        }

        let parsed = extracted.records.len();
        let records: Vec<U::Record> = extracted
            .records
            .into_iter()
            .filter(|record| unit.keep(record))
            .collect();
        trace!("[{}] {} of {parsed} records kept", unit.label(), records.len());

        Ok(Outcome {
            filtered: parsed - records.len(),
            skipped: extracted.skipped.len(),
            records,
            cache_hit,
        })
    }
}
