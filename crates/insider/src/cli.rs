use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the YAML settings document.
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Sets the level of tracing; overrides `logging.level`.
    #[arg(short, long, global = true)]
    pub trace: Option<TraceLevel>,

    /// Hide the progress bars.
    #[arg(long, global = true)]
    pub no_tui: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commands {
    /// Scrape openinsider.com month by month into the trades file.
    Scrape,

    /// Download daily price histories for every ticker in the trades file.
    Prices,

    /// Compute forward returns for every trade in the trades file.
    Returns,
}

#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
#[clap(rename_all = "UPPERCASE")]
pub enum TraceLevel {
    DEBUG,
    ERROR,
    INFO,
    TRACE,
    WARN,
}

impl From<TraceLevel> for Level {
    fn from(level: TraceLevel) -> Self {
        match level {
            TraceLevel::DEBUG => Level::DEBUG,
            TraceLevel::ERROR => Level::ERROR,
            TraceLevel::INFO => Level::INFO,
            TraceLevel::TRACE => Level::TRACE,
            TraceLevel::WARN => Level::WARN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subcommands_need_no_arguments() {
        let cli = Cli::try_parse_from(["insider", "scrape"]).unwrap();
        assert_eq!(cli.command, Commands::Scrape);
        assert_eq!(cli.config, PathBuf::from("config.yaml"));
        assert_eq!(cli.trace, None);
        assert!(!cli.no_tui);
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "insider", "prices", "--config", "alt.yaml", "--trace", "DEBUG", "--no-tui",
        ])
        .unwrap();
        assert_eq!(cli.command, Commands::Prices);
        assert_eq!(cli.config, PathBuf::from("alt.yaml"));
        assert_eq!(cli.trace.map(Level::from), Some(Level::DEBUG));
        assert!(cli.no_tui);
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["insider", "notebook"]).is_err());
    }
}
