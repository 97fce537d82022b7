mod analysis;
mod cache;
mod history;
mod history_table;
mod indicators;
mod market;
mod storage;
mod tui;

use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::cache::CoinListCache;
use crate::history::HistoryStore;
use crate::market::MarketClient;
use crate::storage::StorageDir;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let mode = std::env::args().nth(1);
    match mode.as_deref() {
        None => tui::run_tui().await,
        Some("auto") => {
            let coin_id = std::env::args()
                .nth(2)
                .unwrap_or_else(|| "bitcoin".to_string());
            auto_query(&coin_id).await
        }
        Some(other) => {
            eprintln!("Unknown mode '{other}'. Usage: coin-pulse [auto [coin_id]]");
            std::process::exit(2);
        }
    }
}

/// The TUI owns the terminal, so log lines go to a file next to the binary.
fn init_logging() -> Result<()> {
    let exe_path = std::env::current_exe()?;
    let log_path = exe_path
        .parent()
        .map(|dir| dir.join("coin-pulse.log"))
        .unwrap_or_else(|| "coin-pulse.log".into());
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;

    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

/// Headless mode: one query for a fixed coin, step log on stdout, then the
/// recorded history table.
async fn auto_query(coin_id: &str) -> Result<()> {
    let storage = StorageDir::new_relative("storage").await?;
    let config = storage.load_config().await;
    let client = MarketClient::new()?;
    let cache = Mutex::new(CoinListCache::new(Duration::from_secs(config.cache_ttl_secs)));
    let history = HistoryStore::new(storage);

    println!("\n--- Step 1: Fetching Top Coins ---");
    let coins = client.top_coins_cached(&cache, config.top_limit).await?;
    println!("Provider returned {} coins", coins.len());

    let Some(coin) = coins.iter().find(|c| c.id == coin_id) else {
        eprintln!("Coin '{coin_id}' is not in the top {} list", config.top_limit);
        std::process::exit(1);
    };

    println!("\n--- Step 2: Querying {} ({} days) ---", coin.name, config.days);
    let report = analysis::run_query(
        &client,
        &history,
        &coin.id,
        &coin.name,
        config.days,
        &config.vs_currency,
    )
    .await?;
    println!(
        "Fetched {} samples; latest {:.2} {}; suggested action: {}",
        report.indicators.len(),
        report.latest_price,
        config.vs_currency.to_uppercase(),
        report.action
    );

    println!("\n--- Step 3: Query History ---");
    history_table::run(&history).await
}
