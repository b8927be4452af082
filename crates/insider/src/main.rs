mod cli;
mod spider;

use clap::Parser;
use cli::Cli;
use insider_spider::Config;
use tracing::{trace, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // config first; logging settings live inside it
    let config = Config::load(&cli.config)?;
    insider_spider::logging::init(&config.logging, cli.trace.map(Level::from))?;
    trace!("command line input recorded: {cli:?}");

    let tui = !cli.no_tui;
    spider::run(cli.command, &config, tui).await?;

    Ok(())
}
