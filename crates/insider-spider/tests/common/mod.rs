#![allow(dead_code)]

use insider_spider::Config;
use std::path::Path;

pub const OPENINSIDER_PAGE: &str = include_str!("../files/openinsider.html");

/// Settings pointing every directory into `dir` and every base url at `server`.
pub fn config(dir: &Path, server: &str, max_workers: usize, cache: bool) -> Config {
    let yaml = format!(
        r#"
output:
  directory: "{dir}/data"
  filename: insider_trades.csv
  format: csv
scraping:
  start_year: 2024
  start_month: 1
  max_workers: {max_workers}
  retry_attempts: 3
  timeout: 5
  retry_delay: 0
  base_url: "{server}/screener"
filters:
  min_transaction_value: 50000
  transaction_types: ["P - Purchase", "S - Sale"]
  exclude_companies: []
  min_shares_traded: 100
logging:
  level: INFO
  file: "{dir}/scraper.log"
  rotate_logs: true
  max_log_size: 10
cache:
  enabled: {cache}
  directory: "{dir}/.cache"
  max_age: 24
prices:
  directory: "{dir}/ticker_data"
  base_url: "{server}"
"#,
        dir = dir.display(),
    );
    let config: Config = serde_yaml::from_str(&yaml).unwrap();
    config.validate().unwrap();
    config
}
