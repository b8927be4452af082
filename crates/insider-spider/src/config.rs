//! Typed settings document.
//!
//! The document is YAML with five required sections (`output`, `scraping`,
//! `filters`, `logging`, `cache`) and two optional ones (`prices`,
//! `returns`). It is loaded once at start up and passed by reference into
//! every component; nothing mutates it afterwards.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::Level;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub output: OutputConfig,
    pub scraping: ScrapingConfig,
    pub filters: FilterConfig,
    pub logging: LoggingConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub prices: PricesConfig,
    #[serde(default)]
    pub returns: ReturnsConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub filename: String,
    pub format: OutputFormat,
}

impl OutputConfig {
    /// `directory/filename`
    pub fn path(&self) -> PathBuf {
        self.directory.join(&self.filename)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct ScrapingConfig {
    pub start_year: i32,
    pub start_month: u32,
    /// Size of the worker pool; `0` means one worker per cpu.
    pub max_workers: usize,
    /// Total attempts per request, the first one included.
    pub retry_attempts: u32,
    /// Per-request timeout, in seconds.
    pub timeout: u64,
    /// Base delay between retries, in seconds; doubles every attempt.
    #[serde(default = "default_retry_delay")]
    pub retry_delay: f64,
    #[serde(default = "default_screener_url")]
    pub base_url: String,
}

impl ScrapingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs_f64(self.retry_delay)
    }

    pub fn workers(&self) -> usize {
        match self.max_workers {
            0 => num_cpus::get(),
            n => n,
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct FilterConfig {
    #[serde(default)]
    pub min_transaction_value: f64,
    /// Allowed transaction types; empty allows all.
    #[serde(default)]
    pub transaction_types: Vec<String>,
    #[serde(default)]
    pub exclude_companies: Vec<String>,
    /// When non-empty, only these tickers are kept.
    #[serde(default)]
    pub include_companies: Vec<String>,
    #[serde(default)]
    pub min_shares_traded: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub file: PathBuf,
    pub rotate_logs: bool,
    /// Rotation threshold, in MiB.
    pub max_log_size: u64,
}

impl LoggingConfig {
    pub fn level(&self) -> Result<Level, ConfigError> {
        parse_level(&self.level)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub directory: PathBuf,
    /// Entry lifetime, in hours.
    pub max_age: u64,
}

impl CacheConfig {
    pub fn max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_age as i64)
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PricesConfig {
    pub directory: PathBuf,
    pub base_url: String,
    pub range: String,
    pub interval: String,
    /// Series with this many bars or fewer are not written.
    pub min_bars: usize,
}

impl Default for PricesConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("ticker_data"),
            base_url: String::from("https://query1.finance.yahoo.com"),
            range: String::from("10y"),
            interval: String::from("1d"),
            min_bars: 5,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReturnsConfig {
    /// Defaults to `output.directory` when absent.
    pub directory: Option<PathBuf>,
    pub filename: String,
    /// Forward horizons, in trading days.
    pub horizons: Vec<usize>,
}

impl Default for ReturnsConfig {
    fn default() -> Self {
        Self {
            directory: None,
            filename: String::from("insider_trades_with_returns.csv"),
            horizons: vec![1, 5, 15, 30, 60, 90, 180],
        }
    }
}

/// Upper bound of `scraping.retry_delay`, in seconds.
pub const MAX_RETRY_DELAY: f64 = 3600.0;

/// Upper bound of `cache.max_age`: ten years, in hours.
pub const MAX_CACHE_AGE: u64 = 24 * 365 * 10;

fn default_retry_delay() -> f64 {
    2.0
}

fn default_screener_url() -> String {
    String::from("http://openinsider.com/screener")
}

impl Config {
    /// Read, parse and validate the settings document at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=12).contains(&self.scraping.start_month) {
            return Err(ConfigError::Invalid {
                key: "scraping.start_month",
                reason: format!("{} is not a month (1-12)", self.scraping.start_month),
            });
        }
        if chrono::NaiveDate::from_ymd_opt(self.scraping.start_year, 1, 1).is_none() {
            return Err(ConfigError::Invalid {
                key: "scraping.start_year",
                reason: format!("{} is out of range", self.scraping.start_year),
            });
        }
        if self.scraping.retry_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "scraping.retry_attempts",
                reason: "at least one attempt is required".into(),
            });
        }
        if self.scraping.timeout == 0 {
            return Err(ConfigError::Invalid {
                key: "scraping.timeout",
                reason: "timeout must be positive".into(),
            });
        }
        if !self.scraping.retry_delay.is_finite()
            || !(0.0..=MAX_RETRY_DELAY).contains(&self.scraping.retry_delay)
        {
            return Err(ConfigError::Invalid {
                key: "scraping.retry_delay",
                reason: format!("{} is not a valid delay", self.scraping.retry_delay),
            });
        }
        if self.cache.max_age > MAX_CACHE_AGE {
            return Err(ConfigError::Invalid {
                key: "cache.max_age",
                reason: format!("{} hours exceeds {MAX_CACHE_AGE}", self.cache.max_age),
            });
        }
        if !self.filters.min_transaction_value.is_finite() {
            return Err(ConfigError::Invalid {
                key: "filters.min_transaction_value",
                reason: "must be a finite number".into(),
            });
        }
        if self.output.filename.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "output.filename",
                reason: "filename is empty".into(),
            });
        }
        if self.returns.horizons.iter().any(|h| *h == 0) {
            return Err(ConfigError::Invalid {
                key: "returns.horizons",
                reason: "horizons are counted in trading days and must be positive".into(),
            });
        }
        self.logging.level()?;
        Ok(())
    }

    /// Where forward returns are written.
    pub fn returns_path(&self) -> PathBuf {
        self.returns
            .directory
            .as_ref()
            .unwrap_or(&self.output.directory)
            .join(&self.returns.filename)
    }
}

/// Accepts tracing's level names as well as `WARNING`, `CRITICAL` and
/// `FATAL`, in any case.
pub fn parse_level(level: &str) -> Result<Level, ConfigError> {
    match level.trim().to_ascii_uppercase().as_str() {
        "WARNING" => Ok(Level::WARN),
        "CRITICAL" | "FATAL" => Ok(Level::ERROR),
        other => other.parse::<Level>().map_err(|_| ConfigError::Invalid {
            key: "logging.level",
            reason: format!("unknown level {level:?}"),
        }),
    }
}
