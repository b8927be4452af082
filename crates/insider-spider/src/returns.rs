//! Forward returns of every scraped trade.
//!
//! For a trade on day `d` the entry bar is the first bar dated on or after
//! `d`. The return over `h` trading days is the percent change of the close
//! from the entry bar to `h` bars later. It is empty when the history ends
//! too soon, when the entry close is zero, or when the ticker has no price
//! file.

use crate::config::Config;
use crate::error::{Error, ReadError};
use crate::pipeline::Summary;
use crate::stock::PriceBar;
use chrono::NaiveDate;
use csv::StringRecord;
use rayon::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use tracing::{debug, info, warn};

/// Closing prices of one ticker, ascending by date.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PriceHistory {
    dates: Vec<NaiveDate>,
    closes: Vec<f64>,
}

impl PriceHistory {
    pub fn from_bars(bars: &[PriceBar]) -> Self {
        let mut points: Vec<(NaiveDate, f64)> = bars.iter().map(|bar| (bar.date, bar.close)).collect();
        points.sort_by_key(|(date, _)| *date);
        points.dedup_by_key(|(date, _)| *date);
        let (dates, closes) = points.into_iter().unzip();
        Self { dates, closes }
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Index of the first bar dated on or after `date`.
    pub fn entry_index(&self, date: NaiveDate) -> Option<usize> {
        let i = self.dates.partition_point(|d| *d < date);
        (i < self.dates.len()).then_some(i)
    }

    /// Percent returns for each horizon, in horizon order.
    pub fn forward_returns(&self, date: NaiveDate, horizons: &[usize]) -> Vec<Option<f64>> {
        let Some(entry) = self.entry_index(date) else {
            return vec![None; horizons.len()];
        };
        let base = self.closes[entry];
        horizons
            .iter()
            .map(|h| {
                let exit = self.closes.get(entry + h)?;
                (base != 0.0).then(|| (exit - base) / base * 100.0)
            })
            .collect()
    }
}

/// One input trade row and its returns.
#[derive(Clone, Debug, PartialEq)]
pub struct TradeReturns {
    pub trade: StringRecord,
    pub returns: Vec<Option<f64>>,
}

/// The trade file's columns extended with one return column per horizon.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnsTable {
    pub headers: StringRecord,
    pub horizons: Vec<usize>,
    pub rows: Vec<TradeReturns>,
}

fn column(headers: &StringRecord, path: &Path, column: &'static str) -> Result<usize, ReadError> {
    headers
        .iter()
        .position(|header| header == column)
        .ok_or_else(|| ReadError::MissingColumn {
            path: path.to_path_buf(),
            column,
        })
}

// accepts `2024-03-13` as well as a date-time starting with the date
fn trade_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    let date = value.get(..10).unwrap_or(value);
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Load a ticker's history; `None` when there is no usable price file.
fn load_history(dir: &Path, ticker: &str) -> Option<PriceHistory> {
    let path = crate::writer::price_path(dir, ticker);
    if !path.exists() {
        debug!("no price file for [{ticker}]");
        return None;
    }
    match crate::fs::read_price_bars(&path, ticker) {
        Ok(bars) => Some(PriceHistory::from_bars(&bars)),
        Err(err) => {
            warn!("failed to read prices for [{ticker}], error({err})");
            None
        }
    }
}

/// Compute returns for every trade row, preserving input order.
pub fn compute(
    headers: StringRecord,
    trades: Vec<StringRecord>,
    path: &Path,
    prices_dir: &Path,
    horizons: &[usize],
) -> Result<ReturnsTable, ReadError> {
    let ticker_col = column(&headers, path, "ticker")?;
    let date_col = column(&headers, path, "trade_date")?;

    // every price file is read once, however many trades reference it
    let tickers: BTreeSet<&str> = trades
        .iter()
        .filter_map(|row| row.get(ticker_col))
        .map(str::trim)
        .filter(|ticker| !ticker.is_empty())
        .collect();
    let histories: HashMap<&str, PriceHistory> = tickers
        .into_par_iter()
        .filter_map(|ticker| load_history(prices_dir, ticker).map(|history| (ticker, history)))
        .collect();
    debug!("{} price histories loaded", histories.len());

    let rows = trades
        .par_iter()
        .map(|row| {
            let ticker = row.get(ticker_col).unwrap_or_default().trim();
            let date = row.get(date_col).and_then(trade_date);
            let returns = match (histories.get(ticker), date) {
                (Some(history), Some(date)) => history.forward_returns(date, horizons),
                _ => vec![None; horizons.len()],
            };
            TradeReturns {
                trade: row.clone(),
                returns,
            }
        })
        .collect();

    Ok(ReturnsTable {
        headers,
        horizons: horizons.to_vec(),
        rows,
    })
}

/// Read the trades file, compute forward returns and write them next to it.
pub fn run(config: &Config) -> Result<Summary, Error> {
    let time = std::time::Instant::now();
    let trades_path = config.output.path();
    info!("computing forward returns for {} ...", trades_path.display());

    let (headers, trades) = crate::fs::read_trades(&trades_path)?;
    let total = trades.len();
    let table = compute(
        headers,
        trades,
        &trades_path,
        &config.prices.directory,
        &config.returns.horizons,
    )?;

    let output = config.returns_path();
    crate::writer::write_returns(&table, &output)?;

    let priced = table
        .rows
        .iter()
        .filter(|row| row.returns.iter().any(Option::is_some))
        .count();
    info!(
        "{total} trades ({priced} with returns) saved to {}. {}",
        output.display(),
        crate::time_elapsed(time)
    );

    Ok(Summary {
        output,
        written: total,
        succeeded: priced,
        failed: 0,
        skipped: total - priced,
        filtered: 0,
        cache_hits: 0,
    })
}
