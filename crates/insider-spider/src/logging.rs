//! Tracing subscriber setup: human readable output on stderr plus a plain
//! text log file, optionally rotated by size.
//!
//! `RUST_LOG` takes precedence over the configured level. HTTP plumbing
//! crates are held at `warn` so that `debug` and `trace` stay readable.

use crate::config::LoggingConfig;
use crate::error::Error;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Targets that only produce connection-level chatter.
pub const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls", "html5ever", "selectors"];

/// Rotated files kept next to the active log: `<file>.1` (newest) to `<file>.5`.
pub const LOG_BACKUPS: u32 = 5;

fn build_filter(level: Level) -> Result<EnvFilter, Error> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = level.as_str().to_lowercase();
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{module}=warn"));
    }
    EnvFilter::try_new(&directives).map_err(|err| Error::Logging(err.to_string()))
}

/// Install the global subscriber. `level` overrides `config.level` (the
/// `--trace` flag).
pub fn init(config: &LoggingConfig, level: Option<Level>) -> Result<(), Error> {
    let level = match level {
        Some(level) => level,
        None => config.level()?,
    };
    let filter = build_filter(level)?;

    let stderr = fmt::layer().with_writer(io::stderr).with_target(false);

    let file = if config.file.as_os_str().is_empty() {
        None
    } else {
        let max_bytes = (config.rotate_logs && config.max_log_size > 0)
            .then(|| config.max_log_size.saturating_mul(1024 * 1024));
        let log_file = LogFile::open(&config.file, max_bytes, LOG_BACKUPS).map_err(|err| {
            Error::Logging(format!(
                "failed to open log file {}, error({err})",
                config.file.display()
            ))
        })?;
        Some(
            fmt::layer()
                .with_writer(Mutex::new(log_file))
                .with_ansi(false),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|err| Error::Logging(err.to_string()))?;

    tracing::debug!("logging initialised at {level}");
    Ok(())
}

/// Append-only log file that moves itself aside once it grows past
/// `max_bytes`.
#[derive(Debug)]
pub struct LogFile {
    file: File,
    path: PathBuf,
    size: u64,
    max_bytes: Option<u64>,
    backups: u32,
}

impl LogFile {
    /// Open (or create) `path` for appending; `max_bytes = None` never rotates.
    pub fn open(path: impl AsRef<Path>, max_bytes: Option<u64>, backups: u32) -> io::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = Self::append(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            file,
            path: path.to_path_buf(),
            size,
            max_bytes,
            backups,
        })
    }

    fn append(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    /// `<file>.<n>`
    pub fn backup_path(&self, n: u32) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{n}"));
        PathBuf::from(name)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.backups == 0 {
            self.file = OpenOptions::new()
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            self.size = 0;
            return Ok(());
        }

        let oldest = self.backup_path(self.backups);
        if oldest.exists() {
            std::fs::remove_file(&oldest)?;
        }
        for n in (1..self.backups).rev() {
            let from = self.backup_path(n);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(n + 1))?;
            }
        }
        std::fs::rename(&self.path, self.backup_path(1))?;

        self.file = Self::append(&self.path)?;
        self.size = 0;
        Ok(())
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file.write(buf)?;
        self.size += written as u64;
        if let Some(max) = self.max_bytes {
            if self.size >= max {
                self.rotate()?;
            }
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}
