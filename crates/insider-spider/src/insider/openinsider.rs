use crate::config::Config;
use crate::error::{Error, ParseError};
use crate::filter::FilterSet;
use crate::insider::{normalise, TradeRecord, TransactionType};
use crate::pipeline::{Extracted, Pipeline, Summary, Unit};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use scraper::{ElementRef, Html, Selector};
use std::sync::Arc;
use tracing::{info, trace};

/// Cells read from each screener row, in page order.
pub const COLUMNS: usize = 13;

lazy_static::lazy_static! {
    static ref TABLE: Selector = Selector::parse("table.tinytable").expect("static selector");
    static ref ROWS: Selector = Selector::parse("tbody tr").expect("static selector");
    static ref CELLS: Selector = Selector::parse("td").expect("static selector");
    static ref LINK: Selector = Selector::parse("a").expect("static selector");
}

///////////////////////////////////////////////////////////
// Units
///////////////////////////////////////////////////////////

/// One calendar month of screener results.
#[derive(Clone, Debug)]
pub struct MonthUnit {
    pub year: i32,
    pub month: u32,
    base_url: String,
    min_value: f64,
    filters: Arc<FilterSet>,
}

impl MonthUnit {
    pub fn new(year: i32, month: u32, config: &Config, filters: Arc<FilterSet>) -> Self {
        Self {
            year,
            month,
            base_url: config.scraping.base_url.clone(),
            min_value: config.filters.min_transaction_value,
            filters,
        }
    }

    /// First and last day of the month.
    fn range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let first = NaiveDate::from_ymd_opt(self.year, self.month, 1)?;
        let next = match self.month {
            12 => NaiveDate::from_ymd_opt(self.year + 1, 1, 1)?,
            m => NaiveDate::from_ymd_opt(self.year, m + 1, 1)?,
        };
        Some((first, next.pred_opt()?))
    }
}

impl Unit for MonthUnit {
    type Record = TradeRecord;

    fn label(&self) -> String {
        format!("trades_{}_{:02}", self.year, self.month)
    }

    fn url(&self) -> String {
        let fdr = match self.range() {
            Some((first, last)) => format!(
                "{}+-+{}",
                first.format("%m/%d/%Y"),
                last.format("%m/%d/%Y")
            ),
            None => String::new(),
        };
        // the screener's value bound is in thousands of dollars
        let vl = match (self.min_value / 1000.0).floor() {
            k if k >= 1.0 => format!("{k}"),
            _ => String::new(),
        };
        format!(
            "{}?s=&o=&pl=&ph=&ll=&lh=&fd=-1&fdr={fdr}&td=0&tdr=&fdlyl=&fdlyh=&daysago=\
            &xp=1&xs=1&vl={vl}&vh=&ocl=&och=&sic1=-1&sicl=100&sich=9999&grp=0\
            &nfl=&nfh=&nil=&nih=&nol=&noh=&v2l=&v2h=&oc2l=&oc2h=&sortcol=0&cnt=5000&page=1",
            self.base_url
        )
    }

    fn extract(&self, payload: &str) -> Result<Extracted<TradeRecord>, ParseError> {
        parse_page(payload)
    }

    fn keep(&self, record: &TradeRecord) -> bool {
        match self.filters.rejection(record) {
            Some(reason) => {
                trace!("dropping {} {}, {reason}", record.ticker, record.trade_date);
                false
            }
            None => true,
        }
    }
}

/// Every (year, month) from the start month through `today`'s month.
pub fn months(start_year: i32, start_month: u32, today: NaiveDate) -> Vec<(i32, u32)> {
    let mut months = Vec::new();
    let (mut year, mut month) = (start_year, start_month);
    while (year, month) <= (today.year(), today.month()) {
        months.push((year, month));
        if month == 12 {
            year += 1;
            month = 1;
        } else {
            month += 1;
        }
    }
    months
}

/// Scrape every month from the configured start through `today`, filter,
/// and write the trades file.
pub async fn scrape(config: &Config, pipeline: &Pipeline, today: NaiveDate) -> Result<Summary, Error> {
    let filters = Arc::new(FilterSet::from(&config.filters));
    let units: Vec<MonthUnit> = months(config.scraping.start_year, config.scraping.start_month, today)
        .into_iter()
        .map(|(year, month)| MonthUnit::new(year, month, config, filters.clone()))
        .collect();

    let mut batch = pipeline.run(units, "trades").await;
    normalise(&mut batch.records);

    let path = crate::writer::write_trades(&batch.records, &config.output)?;
    info!("{} trades saved to {}", batch.records.len(), path.display());
    Ok(batch.summary(path))
}

///////////////////////////////////////////////////////////
// Parsing
///////////////////////////////////////////////////////////

/// Parse a screener page. A page without the results table is an error;
/// bad rows are skipped and reported.
pub fn parse_page(html: &str) -> Result<Extracted<TradeRecord>, ParseError> {
    let document = Html::parse_document(html);
    let table = document.select(&TABLE).next().ok_or(ParseError::MissingTable)?;

    let mut extracted = Extracted::new(Vec::new());
    for row in table.select(&ROWS) {
        let cells: Vec<String> = row.select(&CELLS).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }
        match parse_row(&cells) {
            Ok(record) => extracted.records.push(record),
            Err(err) => extracted.skipped.push(err),
        }
    }
    Ok(extracted)
}

// link text when the cell holds a link, the cell text otherwise
fn cell_text(cell: ElementRef) -> String {
    let text: String = match cell.select(&LINK).next() {
        Some(link) => link.text().collect(),
        None => cell.text().collect(),
    };
    text.trim().to_string()
}

fn parse_row(cells: &[String]) -> Result<TradeRecord, ParseError> {
    if cells.len() < COLUMNS {
        return Err(ParseError::ShortRow {
            found: cells.len(),
            expected: COLUMNS,
        });
    }

    let ticker = cells[3].clone();
    if ticker.is_empty() {
        return Err(ParseError::field("ticker", ""));
    }

    Ok(TradeRecord {
        flags: cells[0].clone(),
        filing_date: parse_datetime("filing_date", &cells[1])?,
        trade_date: parse_date("trade_date", &cells[2])?,
        ticker,
        company_name: cells[4].clone(),
        insider_name: cells[5].clone(),
        title: cells[6].clone(),
        transaction_type: TransactionType::from(cells[7].clone()),
        price: parse_money("price", &cells[8])?,
        quantity: parse_shares("quantity", &cells[9])?,
        shares_held: parse_shares("shares_held", &cells[10])?,
        ownership_change: parse_percent("ownership_change", &cells[11])?,
        value: parse_money("value", &cells[12])?,
    })
}

fn clean(value: &str) -> String {
    value
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '+' | '%') && !c.is_whitespace())
        .collect()
}

pub(crate) fn parse_money(column: &'static str, value: &str) -> Result<f64, ParseError> {
    let cleaned = clean(value);
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| ParseError::field(column, value))
}

pub(crate) fn parse_shares(column: &'static str, value: &str) -> Result<i64, ParseError> {
    clean(value)
        .parse::<i64>()
        .map_err(|_| ParseError::field(column, value))
}

/// `None` for a new position (`New`), `n/a` or an empty cell; `>999%` is
/// capped at 999.
pub(crate) fn parse_percent(column: &'static str, value: &str) -> Result<Option<f64>, ParseError> {
    let trimmed = value.trim();
    if trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("new")
        || trimmed.eq_ignore_ascii_case("n/a")
    {
        return Ok(None);
    }
    if trimmed.starts_with('>') {
        return Ok(Some(999.0));
    }
    parse_money(column, trimmed).map(Some)
}

pub(crate) fn parse_date(column: &'static str, value: &str) -> Result<NaiveDate, ParseError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| ParseError::field(column, value))
}

pub(crate) fn parse_datetime(column: &'static str, value: &str) -> Result<NaiveDateTime, ParseError> {
    let value_trim = value.trim();
    NaiveDateTime::parse_from_str(value_trim, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value_trim, "%Y-%m-%d %H:%M"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value_trim, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .ok_or_else(|| ParseError::field(column, value))
}
