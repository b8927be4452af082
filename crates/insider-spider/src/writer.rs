//! Output files.
//!
//! Trades go to `output.directory/output.filename` as CSV or Parquet; price
//! histories to one CSV per ticker; forward returns to a single CSV. Every
//! writer creates its directory first and surfaces I/O failures as
//! [`WriteError`].

use crate::config::{OutputConfig, OutputFormat};
use crate::error::WriteError;
use crate::insider::{normalise, TradeRecord};
use crate::returns::ReturnsTable;
use crate::stock::PriceSeries;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Header of every per-ticker price file.
pub const PRICE_HEADER: [&str; 6] = ["Date", "Open", "High", "Low", "Close", "Volume"];

fn ensure_dir(dir: &Path) -> Result<(), WriteError> {
    if dir.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|source| WriteError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

fn ensure_parent(path: &Path) -> Result<(), WriteError> {
    match path.parent() {
        Some(parent) => ensure_dir(parent),
        None => Ok(()),
    }
}

fn csv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>, WriteError> {
    csv::Writer::from_path(path).map_err(|source| WriteError::Csv {
        path: path.to_path_buf(),
        source,
    })
}

fn csv_error(path: &Path) -> impl Fn(csv::Error) -> WriteError + '_ {
    move |source| WriteError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

fn flush<W: std::io::Write>(mut writer: csv::Writer<W>, path: &Path) -> Result<(), WriteError> {
    writer.flush().map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })
}

///////////////////////////////////////////////////////////
// Trades
///////////////////////////////////////////////////////////

/// Write `records` in the configured format, sorted and de-duplicated (see
/// [`normalise`]). Returns the written path.
pub fn write_trades(records: &[TradeRecord], config: &OutputConfig) -> Result<PathBuf, WriteError> {
    ensure_dir(&config.directory)?;
    let path = config.path();
    let mut records = records.to_vec();
    normalise(&mut records);
    let records = records.as_slice();
    debug!("writing {} trades to {}", records.len(), path.display());

    match config.format {
        OutputFormat::Csv => write_trades_csv(records, &path)?,
        OutputFormat::Parquet => write_trades_parquet(records, &path)?,
    }
    Ok(path)
}

fn write_trades_csv(records: &[TradeRecord], path: &Path) -> Result<(), WriteError> {
    let mut writer = csv_writer(path)?;
    if records.is_empty() {
        // serde only emits headers alongside the first row
        writer
            .write_record(TRADE_COLUMNS)
            .map_err(csv_error(path))?;
    }
    for record in records {
        writer.serialize(record).map_err(csv_error(path))?;
    }
    flush(writer, path)
}

/// Column names of the trades file, in field order.
pub const TRADE_COLUMNS: [&str; 13] = [
    "flags",
    "filing_date",
    "trade_date",
    "ticker",
    "company_name",
    "insider_name",
    "title",
    "transaction_type",
    "price",
    "quantity",
    "shares_held",
    "ownership_change",
    "value",
];

#[cfg(feature = "parquet")]
fn write_trades_parquet(records: &[TradeRecord], path: &Path) -> Result<(), WriteError> {
    use polars::prelude::*;

    let parquet_error = |err: PolarsError| WriteError::Parquet {
        path: path.to_path_buf(),
        reason: err.to_string(),
    };

    let mut df = df!(
        "flags" => records.iter().map(|r| r.flags.clone()).collect::<Vec<String>>(),
        "filing_date" => records.iter().map(|r| r.filing_date.to_string()).collect::<Vec<String>>(),
        "trade_date" => records.iter().map(|r| r.trade_date.to_string()).collect::<Vec<String>>(),
        "ticker" => records.iter().map(|r| r.ticker.clone()).collect::<Vec<String>>(),
        "company_name" => records.iter().map(|r| r.company_name.clone()).collect::<Vec<String>>(),
        "insider_name" => records.iter().map(|r| r.insider_name.clone()).collect::<Vec<String>>(),
        "title" => records.iter().map(|r| r.title.clone()).collect::<Vec<String>>(),
        "transaction_type" => records.iter().map(|r| r.transaction_type.to_string()).collect::<Vec<String>>(),
        "price" => records.iter().map(|r| r.price).collect::<Vec<f64>>(),
        "quantity" => records.iter().map(|r| r.quantity).collect::<Vec<i64>>(),
        "shares_held" => records.iter().map(|r| r.shares_held).collect::<Vec<i64>>(),
        "ownership_change" => records.iter().map(|r| r.ownership_change).collect::<Vec<Option<f64>>>(),
        "value" => records.iter().map(|r| r.value).collect::<Vec<f64>>()
    )
    .map_err(parquet_error)?;

    let file = std::fs::File::create(path).map_err(|source| WriteError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ParquetWriter::new(file)
        .finish(&mut df)
        .map_err(parquet_error)?;
    Ok(())
}

#[cfg(not(feature = "parquet"))]
fn write_trades_parquet(_records: &[TradeRecord], _path: &Path) -> Result<(), WriteError> {
    Err(WriteError::UnsupportedFormat(OutputFormat::Parquet.as_str()))
}

///////////////////////////////////////////////////////////
// Prices
///////////////////////////////////////////////////////////

/// Path of a ticker's price file under `dir`, with the ticker made safe to
/// use as a file name (`BRK/B` -> `BRK_B.csv`).
pub fn price_path(dir: &Path, ticker: &str) -> PathBuf {
    dir.join(format!("{}.csv", crate::cache::sanitise(ticker)))
}

/// Write one ticker's bars to `dir/<TICKER>.csv`.
pub fn write_price_series(series: &PriceSeries, dir: &Path) -> Result<PathBuf, WriteError> {
    ensure_dir(dir)?;
    let path = price_path(dir, &series.ticker);
    let mut writer = csv_writer(&path)?;

    writer.write_record(PRICE_HEADER).map_err(csv_error(&path))?;
    for bar in &series.bars {
        writer
            .write_record([
                bar.date.to_string(),
                bar.open.to_string(),
                bar.high.to_string(),
                bar.low.to_string(),
                bar.close.to_string(),
                bar.volume.to_string(),
            ])
            .map_err(csv_error(&path))?;
    }
    flush(writer, &path)?;
    trace!("{} bars written to {}", series.bars.len(), path.display());
    Ok(path)
}

///////////////////////////////////////////////////////////
// Returns
///////////////////////////////////////////////////////////

/// Write the trade columns followed by one `fwd_<h>d` column per horizon.
pub fn write_returns(table: &ReturnsTable, path: &Path) -> Result<(), WriteError> {
    ensure_parent(path)?;
    let mut writer = csv_writer(path)?;

    let mut header: Vec<String> = table.headers.iter().map(str::to_string).collect();
    header.extend(table.horizons.iter().map(|h| format!("fwd_{h}d")));
    writer.write_record(&header).map_err(csv_error(path))?;

    for row in &table.rows {
        let mut fields: Vec<String> = row.trade.iter().map(str::to_string).collect();
        fields.extend(row.returns.iter().map(|r| match r {
            Some(r) => format!("{r:.4}"),
            None => String::new(),
        }));
        writer.write_record(&fields).map_err(csv_error(path))?;
    }
    flush(writer, path)
}
