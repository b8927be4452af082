use crate::error::ReadError;
use crate::stock::PriceBar;
use chrono::NaiveDate;
use csv::StringRecord;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::trace;

fn csv_error(path: &Path) -> impl Fn(csv::Error) -> ReadError + '_ {
    move |source| ReadError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Only csv trade files can be read back.
pub fn ensure_csv(path: &Path) -> Result<(), ReadError> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(()),
        _ => Err(ReadError::NotCsv {
            path: path.to_path_buf(),
        }),
    }
}

/// Reads a trades `.csv` file from `path` as raw rows, header first.
pub fn read_trades(path: &Path) -> Result<(StringRecord, Vec<StringRecord>), ReadError> {
    ensure_csv(path)?;
    trace!("reading file path: {}", path.display());
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;
    let headers = reader.headers().map_err(csv_error(path))?.clone();
    let rows = reader
        .records()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_error(path))?;
    trace!("{} trades read from {}", rows.len(), path.display());
    Ok((headers, rows))
}

#[derive(Deserialize)]
struct TickerRow {
    ticker: String,
}

/// Unique, sorted tickers of a trades `.csv` file.
pub fn read_tickers(path: &Path) -> Result<Vec<String>, ReadError> {
    ensure_csv(path)?;
    trace!("reading file path: {}", path.display());
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;

    let mut tickers = BTreeSet::new();
    for row in reader.deserialize::<TickerRow>() {
        let row = row.map_err(csv_error(path))?;
        let ticker = row.ticker.trim();
        if !ticker.is_empty() {
            tickers.insert(ticker.to_string());
        }
    }
    Ok(tickers.into_iter().collect())
}

#[derive(Deserialize)]
struct PriceRow {
    #[serde(rename = "Date")]
    date: NaiveDate,
    #[serde(rename = "Open")]
    open: f64,
    #[serde(rename = "High")]
    high: f64,
    #[serde(rename = "Low")]
    low: f64,
    #[serde(rename = "Close")]
    close: f64,
    #[serde(rename = "Volume")]
    volume: u64,
}

/// Reads a price history written by [`crate::writer::write_price_series`],
/// sorted by date.
pub fn read_price_bars(path: &Path, ticker: &str) -> Result<Vec<PriceBar>, ReadError> {
    trace!("reading file path: {}", path.display());
    let mut reader = csv::Reader::from_path(path).map_err(csv_error(path))?;

    let mut bars = reader
        .deserialize::<PriceRow>()
        .map(|row| {
            row.map(|row| PriceBar {
                ticker: ticker.to_string(),
                date: row.date,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_error(path))?;
    bars.sort_by_key(|bar| bar.date);
    Ok(bars)
}
