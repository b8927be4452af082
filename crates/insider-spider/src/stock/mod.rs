use chrono::NaiveDate;

/// Daily price history collected from the Yahoo Finance chart API; inspiration from Python's [yfinance] library.
///
/// [yfinance]: https://github.com/ranaroussi/yfinance/
pub mod yahoo_finance;

/// One trading day; OHLC already scaled by `adjclose / close`.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceBar {
    pub ticker: String,
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

/// A ticker's bars in ascending date order.
#[derive(Clone, Debug, PartialEq)]
pub struct PriceSeries {
    pub ticker: String,
    pub bars: Vec<PriceBar>,
}

impl PriceSeries {
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
