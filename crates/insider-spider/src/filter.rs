use crate::config::FilterConfig;
use crate::insider::TradeRecord;
use std::collections::HashSet;
use std::fmt;

/// Active filter rules, normalised once from the config.
#[derive(Clone, Debug, Default)]
pub struct FilterSet {
    min_transaction_value: f64,
    transaction_types: Vec<String>,
    exclude: HashSet<String>,
    include: HashSet<String>,
    min_shares_traded: u64,
}

/// Why a record was dropped.
#[derive(Clone, Debug, PartialEq)]
pub enum Rejection {
    ValueBelowMinimum { value: f64, minimum: f64 },
    TypeNotAllowed(String),
    Excluded(String),
    NotIncluded(String),
    SharesBelowMinimum { shares: u64, minimum: u64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ValueBelowMinimum { value, minimum } => {
                write!(f, "value {value} below minimum {minimum}")
            }
            Self::TypeNotAllowed(kind) => write!(f, "transaction type {kind} not allowed"),
            Self::Excluded(ticker) => write!(f, "{ticker} is excluded"),
            Self::NotIncluded(ticker) => write!(f, "{ticker} is not included"),
            Self::SharesBelowMinimum { shares, minimum } => {
                write!(f, "{shares} shares below minimum {minimum}")
            }
        }
    }
}

fn normalise_ticker(ticker: &str) -> String {
    ticker.trim().to_ascii_uppercase()
}

impl From<&FilterConfig> for FilterSet {
    fn from(config: &FilterConfig) -> Self {
        Self {
            min_transaction_value: config.min_transaction_value,
            transaction_types: config
                .transaction_types
                .iter()
                .map(|kind| kind.trim().to_string())
                .filter(|kind| !kind.is_empty())
                .collect(),
            exclude: config
                .exclude_companies
                .iter()
                .map(|t| normalise_ticker(t))
                .collect(),
            include: config
                .include_companies
                .iter()
                .map(|t| normalise_ticker(t))
                .collect(),
            min_shares_traded: config.min_shares_traded,
        }
    }
}

impl FilterSet {
    /// `true` iff the record passes every active rule.
    pub fn keep(&self, record: &TradeRecord) -> bool {
        self.rejection(record).is_none()
    }

    /// First rule the record fails, if any.
    pub fn rejection(&self, record: &TradeRecord) -> Option<Rejection> {
        let value = record.value.abs();
        if !(value >= self.min_transaction_value) {
            return Some(Rejection::ValueBelowMinimum {
                value,
                minimum: self.min_transaction_value,
            });
        }

        if !self.transaction_types.is_empty()
            && !self
                .transaction_types
                .iter()
                .any(|selector| record.transaction_type.matches(selector))
        {
            return Some(Rejection::TypeNotAllowed(
                record.transaction_type.label().to_string(),
            ));
        }

        let ticker = normalise_ticker(&record.ticker);
        if self.exclude.contains(&ticker) {
            return Some(Rejection::Excluded(ticker));
        }
        if !self.include.is_empty() && !self.include.contains(&ticker) {
            return Some(Rejection::NotIncluded(ticker));
        }

        let shares = record.quantity.unsigned_abs();
        if shares < self.min_shares_traded {
            return Some(Rejection::SharesBelowMinimum {
                shares,
                minimum: self.min_shares_traded,
            });
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::insider::TransactionType;
    use chrono::NaiveDate;

    fn trade() -> TradeRecord {
        TradeRecord {
            flags: String::new(),
            filing_date: NaiveDate::from_ymd_opt(2024, 3, 15)
                .unwrap()
                .and_hms_opt(16, 5, 23)
                .unwrap(),
            trade_date: NaiveDate::from_ymd_opt(2024, 3, 13).unwrap(),
            ticker: "ACME".into(),
            company_name: "Acme Corp".into(),
            insider_name: "Doe John".into(),
            title: "CEO".into(),
            transaction_type: TransactionType::Sale,
            price: 50.0,
            quantity: -2_000,
            shares_held: 10_000,
            ownership_change: Some(-16.0),
            value: -100_000.0,
        }
    }

    fn config() -> FilterConfig {
        FilterConfig {
            min_transaction_value: 50_000.0,
            transaction_types: vec!["P - Purchase".into(), "S - Sale".into()],
            exclude_companies: vec!["bad".into()],
            include_companies: vec![],
            min_shares_traded: 100,
        }
    }

    #[test]
    fn passing_record_is_kept() {
        assert!(FilterSet::from(&config()).keep(&trade()));
    }

    #[test]
    fn empty_config_keeps_everything() {
        let filters = FilterSet::from(&FilterConfig::default());
        let mut record = trade();
        record.value = 0.0;
        record.quantity = 0;
        record.transaction_type = TransactionType::Other("G - Gift".into());
        assert!(filters.keep(&record));
    }

    #[test]
    fn value_is_compared_by_magnitude() {
        let filters = FilterSet::from(&config());
        let mut record = trade();
        record.value = -49_999.0;
        assert_eq!(
            filters.rejection(&record),
            Some(Rejection::ValueBelowMinimum {
                value: 49_999.0,
                minimum: 50_000.0
            })
        );
    }

    #[test]
    fn disallowed_type_is_dropped() {
        let filters = FilterSet::from(&config());
        let mut record = trade();
        record.transaction_type = TransactionType::Tax;
        assert_eq!(
            filters.rejection(&record),
            Some(Rejection::TypeNotAllowed("F - Tax".into()))
        );
    }

    #[test]
    fn excluded_ticker_is_dropped_case_insensitively() {
        let filters = FilterSet::from(&config());
        let mut record = trade();
        record.ticker = "BAD".into();
        assert_eq!(
            filters.rejection(&record),
            Some(Rejection::Excluded("BAD".into()))
        );
    }

    #[test]
    fn include_list_restricts_tickers() {
        let mut config = config();
        config.include_companies = vec!["AAPL".into()];
        let filters = FilterSet::from(&config);
        assert_eq!(
            filters.rejection(&trade()),
            Some(Rejection::NotIncluded("ACME".into()))
        );
    }

    #[test]
    fn shares_are_compared_by_magnitude() {
        let filters = FilterSet::from(&config());
        let mut record = trade();
        record.quantity = -99;
        record.value = -1_000_000.0;
        assert!(!filters.keep(&record));

        record.quantity = -100;
        assert!(filters.keep(&record));
    }

    #[test]
    fn nan_value_never_passes_a_minimum() {
        let filters = FilterSet::from(&config());
        let mut record = trade();
        record.value = f64::NAN;
        assert!(!filters.keep(&record));
    }
}
