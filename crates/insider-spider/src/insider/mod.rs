use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Insider filings scraped from the [openinsider] screener, one page per month.
///
/// [openinsider]: http://openinsider.com/screener
pub mod openinsider;

/// One disclosed insider transaction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// openinsider's "X" column: `M`, `D`, `E`, `A` ... amendment/derivative flags.
    pub flags: String,
    pub filing_date: NaiveDateTime,
    pub trade_date: NaiveDate,
    pub ticker: String,
    pub company_name: String,
    pub insider_name: String,
    /// Role of the insider, e.g. `CEO`, `Dir`, `10%`.
    pub title: String,
    pub transaction_type: TransactionType,
    pub price: f64,
    /// Shares traded; negative for disposals.
    pub quantity: i64,
    pub shares_held: i64,
    /// Change in holdings, in percent; `None` for a new position.
    pub ownership_change: Option<f64>,
    /// Total value of the transaction; negative for disposals.
    pub value: f64,
}

impl TradeRecord {
    /// Total order used to make written output independent of the order in
    /// which units completed.
    pub fn output_order(&self, other: &Self) -> Ordering {
        self.filing_date
            .cmp(&other.filing_date)
            .then_with(|| self.trade_date.cmp(&other.trade_date))
            .then_with(|| self.ticker.cmp(&other.ticker))
            .then_with(|| self.insider_name.cmp(&other.insider_name))
            .then_with(|| self.transaction_type.cmp(&other.transaction_type))
            .then_with(|| self.quantity.cmp(&other.quantity))
            .then_with(|| self.price.total_cmp(&other.price))
            .then_with(|| self.value.total_cmp(&other.value))
            .then_with(|| self.shares_held.cmp(&other.shares_held))
            .then_with(|| self.title.cmp(&other.title))
            .then_with(|| self.flags.cmp(&other.flags))
            .then_with(|| self.company_name.cmp(&other.company_name))
    }
}

/// Sort into output order and drop exact duplicates (the same filing can be
/// listed on two overlapping pages).
pub fn normalise(records: &mut Vec<TradeRecord>) {
    records.sort_by(|a, b| a.output_order(b));
    records.dedup();
}

/// openinsider transaction code.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TransactionType {
    Purchase,
    Sale,
    SaleWithOptionExercise,
    Tax,
    /// Any other code, kept verbatim (`A - Grant`, `G - Gift`, ...).
    Other(String),
}

impl TransactionType {
    pub fn label(&self) -> &str {
        match self {
            Self::Purchase => "P - Purchase",
            Self::Sale => "S - Sale",
            Self::SaleWithOptionExercise => "S - Sale+OE",
            Self::Tax => "F - Tax",
            Self::Other(label) => label.as_str(),
        }
    }

    /// Leading code letter, e.g. `P`.
    pub fn code(&self) -> &str {
        let label = self.label();
        label.split(" - ").next().unwrap_or(label).trim()
    }

    /// Name after the code, e.g. `Purchase`.
    pub fn name(&self) -> &str {
        let label = self.label();
        label.split_once(" - ").map_or(label, |(_, name)| name).trim()
    }

    /// Does a configured selector (`"P - Purchase"`, `"P"` or `"purchase"`)
    /// name this type?
    pub fn matches(&self, selector: &str) -> bool {
        let selector = selector.trim();
        !selector.is_empty()
            && [self.label(), self.code(), self.name()]
                .iter()
                .any(|candidate| candidate.eq_ignore_ascii_case(selector))
    }
}

impl From<String> for TransactionType {
    fn from(label: String) -> Self {
        match label.trim() {
            "P - Purchase" => Self::Purchase,
            "S - Sale" => Self::Sale,
            "S - Sale+OE" => Self::SaleWithOptionExercise,
            "F - Tax" => Self::Tax,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<TransactionType> for String {
    fn from(kind: TransactionType) -> Self {
        kind.label().to_string()
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
