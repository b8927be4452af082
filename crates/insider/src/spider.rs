use crate::cli::Commands;
use colored::Colorize;
use insider_spider::{self as spider, Config, Pipeline, Summary};
use tracing::{debug, info};

/// Run one job to completion and print its summary.
pub(crate) async fn run(command: Commands, config: &Config, tui: bool) -> anyhow::Result<()> {
    let time = std::time::Instant::now();

    let summary = match command {
        Commands::Scrape => {
            let pipeline = Pipeline::from_config(config)?.with_tui(tui);
            debug!("scraping with {} workers", pipeline.max_workers());
            let today = chrono::Local::now().date_naive();
            spider::insider::openinsider::scrape(config, &pipeline, today).await?
        }
        Commands::Prices => {
            let pipeline = Pipeline::from_config(config)?.with_tui(tui);
            spider::stock::yahoo_finance::download(config, &pipeline).await?
        }
        Commands::Returns => spider::returns::run(config)?,
    };

    info!("{command:?} finished, time elapsed: {:?}", time.elapsed());
    if tui {
        print_summary(command, &summary);
    }

    Ok(())
}

fn print_summary(command: Commands, summary: &Summary) {
    let label = format!("{command:?}").to_lowercase();
    println!(
        "{} {} records written to {}",
        label.bold(),
        summary.written.to_string().green(),
        summary.output.display()
    );

    let failed = summary.failed.to_string();
    println!(
        "  {} succeeded, {} failed, {} skipped, {} filtered, {} cache hits",
        summary.succeeded.to_string().green(),
        if summary.failed > 0 { failed.red() } else { failed.normal() },
        summary.skipped.to_string().yellow(),
        summary.filtered,
        summary.cache_hits
    );
}
