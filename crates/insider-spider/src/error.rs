use std::path::PathBuf;
use thiserror::Error;

/// Crate-level error; every fatal path of a run ends up here.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Write(#[from] WriteError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error("failed to initialise logging, error({0})")]
    Logging(String),

    #[error("failed to build http client, error({0})")]
    Client(#[from] reqwest::Error),
}

/// Malformed or unreadable settings document; fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}, error({source})")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}, error({source})")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config value for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Network, timeout or HTTP status failure for a single request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("{url} responded with HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("connection to {url} failed, error({reason})")]
    Connection { url: String, reason: String },
}

/// Malformed page or record.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("no trade table found in page")]
    MissingTable,

    #[error("row has {found} cells, expected at least {expected}")]
    ShortRow { found: usize, expected: usize },

    #[error("invalid {column} value {value:?}")]
    Field { column: &'static str, value: String },

    #[error("invalid payload, error({0})")]
    Payload(String),

    #[error("no results found within payload")]
    Empty,
}

impl ParseError {
    pub(crate) fn field(column: &'static str, value: impl Into<String>) -> Self {
        Self::Field {
            column,
            value: value.into(),
        }
    }
}

/// Failure of one unit of work; logged and skipped by the pipeline.
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Output I/O failure; surfaced to the caller, never retried.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to write {path}, error({source})")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write csv {path}, error({source})")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write parquet {path}, error({reason})")]
    Parquet { path: PathBuf, reason: String },

    #[error("output format `{0}` is not supported by this build")]
    UnsupportedFormat(&'static str),
}

/// Failure reading a file this tool wrote earlier (trades or price csv).
#[derive(Debug, Error)]
pub enum ReadError {
    #[error("failed to read {path}, error({source})")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} is not a csv file; set output.format to csv")]
    NotCsv { path: PathBuf },

    #[error("{path} has no `{column}` column")]
    MissingColumn { path: PathBuf, column: &'static str },
}
