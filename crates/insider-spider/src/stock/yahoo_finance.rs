use super::{PriceBar, PriceSeries};
use crate::config::{Config, PricesConfig};
use crate::error::{Error, ParseError};
use crate::pipeline::{Extracted, Pipeline, Summary, Unit};
use crate::writer::{price_path, write_price_series};
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::{debug, info, trace};

// download
// ----------------------------------------------------------------------------

/// Download price histories for every ticker in the trades file that has no
/// price file yet, then write one csv per ticker.
pub async fn download(config: &Config, pipeline: &Pipeline) -> Result<Summary, Error> {
    let trades = config.output.path();
    info!("reading tickers from {} ...", trades.display());
    let tickers = crate::fs::read_tickers(&trades)?;

    let dir = &config.prices.directory;
    let units: Vec<TickerUnit> = tickers
        .into_iter()
        .filter(|ticker| {
            let exists = price_path(dir, ticker).exists();
            if exists {
                debug!("skipping [{ticker}], price file already exists");
            }
            !exists
        })
        .map(|ticker| TickerUnit::new(ticker, &config.prices))
        .collect();

    let mut batch = pipeline.run(units, "prices").await;
    batch.records.sort_by(|a, b| a.ticker.cmp(&b.ticker));

    for series in &batch.records {
        let path = write_price_series(series, dir)?;
        trace!("[{}] saved to {}", series.ticker, path.display());
    }
    info!("{} price files saved to {}", batch.records.len(), dir.display());
    Ok(batch.summary(dir.clone()))
}

/// One ticker's chart request.
#[derive(Clone, Debug)]
pub struct TickerUnit {
    pub ticker: String,
    base_url: String,
    range: String,
    interval: String,
    min_bars: usize,
}

impl TickerUnit {
    pub fn new(ticker: impl Into<String>, config: &PricesConfig) -> Self {
        Self {
            ticker: ticker.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            range: config.range.clone(),
            interval: config.interval.clone(),
            min_bars: config.min_bars,
        }
    }
}

impl Unit for TickerUnit {
    type Record = PriceSeries;

    fn label(&self) -> String {
        format!("prices_{}", self.ticker)
    }

    fn url(&self) -> String {
        format!(
            "{}/v8/finance/chart/{}?range={}&interval={}",
            self.base_url, self.ticker, self.range, self.interval
        )
    }

    fn extract(&self, payload: &str) -> Result<Extracted<PriceSeries>, ParseError> {
        parse_chart(&self.ticker, payload)
    }

    /// Histories of `min_bars` bars or fewer are dropped.
    fn keep(&self, series: &PriceSeries) -> bool {
        let keep = series.len() > self.min_bars;
        if !keep {
            debug!(
                "dropping [{}], only {} bars (minimum {})",
                self.ticker,
                series.len(),
                self.min_bars + 1
            );
        }
        keep
    }
}

// de
// ----------------------------------------------------------------------------

/// Parse a chart response into a single series. Bars with a missing field
/// are skipped and reported.
pub fn parse_chart(ticker: &str, payload: &str) -> Result<Extracted<PriceSeries>, ParseError> {
    let response: PriceResponse =
        serde_json::from_str(payload).map_err(|err| ParseError::Payload(err.to_string()))?;

    let result = match response.chart.result {
        Some(mut results) if !results.is_empty() => results.swap_remove(0),
        _ => {
            return Err(match response.chart.error {
                Some(err) => ParseError::Payload(format!("{}: {}", err.code, err.description)),
                None => ParseError::Empty,
            })
        }
    };

    let offset = result.meta.and_then(|meta| meta.gmtoffset).unwrap_or(0);
    let quote = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or(ParseError::Empty)?;
    let adjclose = result
        .indicators
        .adjclose
        .into_iter()
        .next()
        .map(|adj| adj.adjclose)
        .unwrap_or_default();

    let mut skipped = Vec::new();
    // keyed by date; a repeated date (the live bar) replaces the earlier one
    let mut bars = BTreeMap::new();
    for (i, timestamp) in result.timestamp.iter().enumerate() {
        let field = |values: &[Option<f64>]| values.get(i).copied().flatten();
        let (Some(open), Some(high), Some(low), Some(close)) = (
            field(&quote.open),
            field(&quote.high),
            field(&quote.low),
            field(&quote.close),
        ) else {
            skipped.push(ParseError::field("quote", format!("{ticker} @ {timestamp}")));
            continue;
        };
        let Some(date) = chrono::DateTime::from_timestamp(timestamp + offset, 0) else {
            skipped.push(ParseError::field("timestamp", timestamp.to_string()));
            continue;
        };
        let volume = quote
            .volume
            .get(i)
            .copied()
            .flatten()
            .map_or(0, |volume| volume.max(0.0) as u64);

        // auto-adjust for splits and dividends
        let factor = match field(&adjclose) {
            Some(adj) if close != 0.0 => adj / close,
            _ => 1.0,
        };

        bars.insert(
            date.date_naive(),
            PriceBar {
                ticker: ticker.to_string(),
                date: date.date_naive(),
                open: open * factor,
                high: high * factor,
                low: low * factor,
                close: close * factor,
                volume,
            },
        );
    }

    let series = PriceSeries {
        ticker: ticker.to_string(),
        bars: bars.into_values().collect(),
    };
    Ok(Extracted {
        records: vec![series],
        skipped,
    })
}

#[derive(Debug, Deserialize)]
struct PriceResponse {
    chart: Chart,
}

#[derive(Debug, Deserialize)]
struct Chart {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartError>,
}

#[derive(Debug, Deserialize)]
struct ChartError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    meta: Option<Meta>,
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Meta {
    gmtoffset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<Quote>,
    #[serde(default)]
    adjclose: Vec<AdjClose>,
}

#[derive(Debug, Deserialize)]
struct Quote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

#[derive(Debug, Deserialize)]
struct AdjClose {
    #[serde(default)]
    adjclose: Vec<Option<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    // 2024-03-13, 2024-03-14 and 2024-03-15 at 13:30 UTC
    const CHART: &str = r#"{
        "chart": {
            "result": [{
                "meta": { "symbol": "ACME", "gmtoffset": -14400 },
                "timestamp": [1710336600, 1710423000, 1710509400],
                "indicators": {
                    "quote": [{
                        "open": [10.0, null, 12.0],
                        "high": [11.0, 12.0, 13.0],
                        "low": [9.0, 10.0, 11.0],
                        "close": [10.0, 11.0, 12.5],
                        "volume": [1000, 2000, null]
                    }],
                    "adjclose": [{ "adjclose": [5.0, 5.5, 12.5] }]
                }
            }],
            "error": null
        }
    }"#;

    #[test]
    fn bars_are_adjusted_and_nulls_skipped() {
        let extracted = parse_chart("ACME", CHART).unwrap();
        assert_eq!(extracted.skipped.len(), 1);

        let series = &extracted.records[0];
        assert_eq!(series.ticker, "ACME");
        assert_eq!(series.len(), 2);

        let first = &series.bars[0];
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2024, 3, 13).unwrap());
        assert_eq!(first.open, 5.0);
        assert_eq!(first.high, 5.5);
        assert_eq!(first.low, 4.5);
        assert_eq!(first.close, 5.0);
        assert_eq!(first.volume, 1000);

        let last = &series.bars[1];
        assert_eq!(last.date, NaiveDate::from_ymd_opt(2024, 3, 15).unwrap());
        assert_eq!(last.close, 12.5);
        assert_eq!(last.volume, 0);
    }

    #[test]
    fn unknown_ticker_reports_the_chart_error() {
        let payload = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert_eq!(
            parse_chart("GONE", payload).unwrap_err(),
            ParseError::Payload("Not Found: No data found, symbol may be delisted".into())
        );
    }

    #[test]
    fn empty_result_is_empty() {
        let payload = r#"{"chart":{"result":[],"error":null}}"#;
        assert_eq!(parse_chart("NONE", payload).unwrap_err(), ParseError::Empty);
        assert!(matches!(
            parse_chart("NONE", "<html>").unwrap_err(),
            ParseError::Payload(_)
        ));
    }

    #[test]
    fn short_histories_are_not_kept() {
        let unit = TickerUnit::new("ACME", &PricesConfig::default());
        let series = |n: usize| PriceSeries {
            ticker: "ACME".into(),
            bars: (0..n)
                .map(|d| PriceBar {
                    ticker: "ACME".into(),
                    date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Days::new(d as u64),
                    open: 1.0,
                    high: 1.0,
                    low: 1.0,
                    close: 1.0,
                    volume: 1,
                })
                .collect(),
        };
        assert!(!unit.keep(&series(5)));
        assert!(unit.keep(&series(6)));
    }

    #[test]
    fn chart_url() {
        let unit = TickerUnit::new("ACME", &PricesConfig::default());
        assert_eq!(unit.label(), "prices_ACME");
        assert_eq!(
            unit.url(),
            "https://query1.finance.yahoo.com/v8/finance/chart/ACME?range=10y&interval=1d"
        );
    }
}
