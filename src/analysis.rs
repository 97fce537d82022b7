//! This module contains the query pipeline logic.

use anyhow::Result;
use chrono::Utc;
use log::{error, info};
use thiserror::Error;

use crate::history::{Action, HistoryRecord, HistoryStore};
use crate::indicators::{self, IndicatorSeries};
use crate::market::{FetchError, MarketClient};

/// Trailing window for the moving average the recommendation compares
/// against.
pub const AVERAGE_WINDOW: usize = 5;

/// Keeps the fetch failure kind intact so the surface can differentiate its
/// messaging; storage faults get their own arm.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("history append failed: {0}")]
    Storage(#[source] anyhow::Error),
}

/// Everything one query produces. The UI reads the whole report; the history
/// store keeps the one-row summary.
#[derive(Debug)]
pub struct QueryReport {
    pub coin: String,
    pub indicators: IndicatorSeries,
    pub latest_price: f64,
    pub avg_5: Option<f64>,
    pub action: Action,
}

/// Runs one full query:
/// 1. Fetches the daily price history for the coin.
/// 2. Augments it with the indicator series.
/// 3. Derives the latest price, 5-sample average and recommendation.
/// 4. Appends the summary row to the history store.
pub async fn run_query(
    client: &MarketClient,
    history: &HistoryStore,
    coin_id: &str,
    coin_name: &str,
    days: u32,
    vs_currency: &str,
) -> Result<QueryReport, QueryError> {
    info!("querying {coin_id} ({days}d, {vs_currency})");

    let series = client
        .fetch_price_history(coin_id, days, vs_currency)
        .await
        .map_err(|err| {
            error!("price history fetch failed for {coin_id}: {err}");
            QueryError::Fetch(err)
        })?;

    let indicators = indicators::compute_indicators(&series);
    let prices: Vec<f64> = series.iter().map(|s| s.price).collect();
    let Some(&latest_price) = prices.last() else {
        return Err(QueryError::Fetch(FetchError::Empty));
    };

    let avg_5 = trailing_average(&prices, AVERAGE_WINDOW);
    let action = recommend(latest_price, avg_5);

    let record = HistoryRecord {
        coin: coin_name.to_string(),
        id: coin_id.to_string(),
        queried_at: Utc::now(),
        latest_price,
        avg_5,
        action,
    };
    history.append(record).await.map_err(QueryError::Storage)?;
    info!("recorded {coin_id}: latest {latest_price}, action {action}");

    Ok(QueryReport {
        coin: coin_name.to_string(),
        indicators,
        latest_price,
        avg_5,
        action,
    })
}

/// Mean of the trailing `window` prices; `None` until enough samples exist.
fn trailing_average(prices: &[f64], window: usize) -> Option<f64> {
    if prices.len() < window || window == 0 {
        return None;
    }
    let tail = &prices[prices.len() - window..];
    Some(tail.iter().sum::<f64>() / window as f64)
}

/// Buy below the trailing average, sell otherwise. An undefined average also
/// lands on sell, matching how the dashboard always behaved on short series.
fn recommend(latest: f64, avg: Option<f64>) -> Action {
    match avg {
        Some(avg) if latest < avg => Action::Buy,
        _ => Action::Sell,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_average_needs_a_full_window() {
        assert_eq!(trailing_average(&[1.0, 2.0, 3.0, 4.0], 5), None);
        assert_eq!(trailing_average(&[], 5), None);
    }

    #[test]
    fn trailing_average_uses_only_the_tail() {
        let prices = [10.0, 20.0, 1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(trailing_average(&prices, 5), Some(3.0));
        assert_eq!(trailing_average(&[2.0, 4.0, 6.0, 8.0, 10.0], 5), Some(6.0));
    }

    #[test]
    fn recommendation_buys_below_the_average() {
        assert_eq!(recommend(99.0, Some(100.0)), Action::Buy);
        assert_eq!(recommend(101.0, Some(100.0)), Action::Sell);
        assert_eq!(recommend(100.0, Some(100.0)), Action::Sell);
    }

    #[test]
    fn recommendation_defaults_to_sell_without_an_average() {
        assert_eq!(recommend(99.0, None), Action::Sell);
    }
}
