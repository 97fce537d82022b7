use std::time::Duration;

use chrono::{DateTime, Utc};
use log::debug;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::cache::CoinListCache;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// CoinGecko caps daily-granularity history at 90 days for unauthenticated
/// callers.
pub const MAX_DAYS: u32 = 90;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// One tagged kind per failure so callers can branch on what went wrong
/// instead of on an ambiguous empty result.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("provider returned no data")]
    Empty,
    #[error("days must be within 1..=90, got {0}")]
    InvalidDays(u32),
}

impl FetchError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Network(err.to_string())
        }
    }

    fn from_decode(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Malformed(err.to_string())
        }
    }
}

/// One row of the top-coins listing; market-cap rank is implicit in position.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinSummary {
    pub id: String,
    pub symbol: String,
    pub name: String,
}

impl CoinSummary {
    /// Case-insensitive substring match against name or symbol. An empty
    /// keyword matches everything.
    pub fn matches(&self, keyword: &str) -> bool {
        if keyword.is_empty() {
            return true;
        }
        let keyword = keyword.to_lowercase();
        self.name.to_lowercase().contains(&keyword) || self.symbol.to_lowercase().contains(&keyword)
    }

    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.symbol.to_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceSample {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Samples in the order the provider sent them (ascending timestamps as far
/// as the provider is honest). No re-sorting, no dedup.
pub type PriceSeries = Vec<PriceSample>;

#[derive(Deserialize)]
struct MarketChart {
    prices: Vec<(i64, f64)>,
}

pub struct MarketClient {
    http: Client,
    base_url: String,
}

impl MarketClient {
    pub fn new() -> anyhow::Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// The base URL is injectable so tests can point the client at a
    /// loopback server.
    pub fn with_base_url(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    /// Fetches the daily price history for one coin. Single attempt, fixed
    /// timeout; callers decide whether to re-invoke.
    pub async fn fetch_price_history(
        &self,
        coin_id: &str,
        days: u32,
        vs_currency: &str,
    ) -> Result<PriceSeries, FetchError> {
        if days == 0 || days > MAX_DAYS {
            return Err(FetchError::InvalidDays(days));
        }

        let url = format!("{}/coins/{}/market_chart", self.base_url, coin_id);
        let days = days.to_string();
        let query = [
            ("vs_currency", vs_currency),
            ("days", days.as_str()),
            ("interval", "daily"),
        ];
        debug!("GET {url}");

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!(
                "provider responded with {status}"
            )));
        }

        let chart: MarketChart = response.json().await.map_err(FetchError::from_decode)?;
        if chart.prices.is_empty() {
            return Err(FetchError::Empty);
        }

        chart
            .prices
            .into_iter()
            .map(|(ms, price)| {
                let timestamp = DateTime::<Utc>::from_timestamp_millis(ms)
                    .ok_or_else(|| FetchError::Malformed(format!("timestamp {ms} out of range")))?;
                Ok(PriceSample { timestamp, price })
            })
            .collect()
    }

    /// Fetches the top-`limit` coins by market cap.
    pub async fn fetch_top_coins(&self, limit: u32) -> Result<Vec<CoinSummary>, FetchError> {
        let url = format!("{}/coins/markets", self.base_url);
        let limit = limit.to_string();
        let query = [
            ("vs_currency", "usd"),
            ("order", "market_cap_desc"),
            ("per_page", limit.as_str()),
            ("page", "1"),
        ];
        debug!("GET {url}");

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(FetchError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Network(format!(
                "provider responded with {status}"
            )));
        }

        let coins: Vec<CoinSummary> = response.json().await.map_err(FetchError::from_decode)?;
        if coins.is_empty() {
            return Err(FetchError::Empty);
        }
        Ok(coins)
    }

    /// Serves the top-coins listing from the time-boxed cache, hitting the
    /// provider only when the entry for this limit is absent or expired.
    pub async fn top_coins_cached(
        &self,
        cache: &Mutex<CoinListCache>,
        limit: u32,
    ) -> Result<Vec<CoinSummary>, FetchError> {
        if let Some(coins) = cache.lock().await.get(limit) {
            debug!("top-coins cache hit (limit {limit})");
            return Ok(coins);
        }
        let coins = self.fetch_top_coins(limit).await?;
        cache.lock().await.put(limit, coins.clone());
        Ok(coins)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn chart_route(payload: serde_json::Value) -> Router {
        Router::new().route(
            "/coins/bitcoin/market_chart",
            get(move || async move { Json(payload) }),
        )
    }

    #[tokio::test]
    async fn history_converts_samples_in_provider_order() {
        let base = serve(chart_route(json!({
            "prices": [
                [1_700_000_000_000i64, 100.0],
                [1_700_086_400_000i64, 102.5],
                [1_700_172_800_000i64, 99.75],
            ]
        })))
        .await;

        let client = MarketClient::with_base_url(base).unwrap();
        let series = client
            .fetch_price_history("bitcoin", 7, "usd")
            .await
            .unwrap();

        assert_eq!(series.len(), 3);
        assert_eq!(series[0].price, 100.0);
        assert_eq!(series[2].price, 99.75);
        assert!(series[0].timestamp < series[1].timestamp);
        assert_eq!(
            series[0].timestamp,
            DateTime::<Utc>::from_timestamp_millis(1_700_000_000_000).unwrap()
        );
    }

    #[tokio::test]
    async fn server_error_is_tagged_network() {
        let router = Router::new().route(
            "/coins/bitcoin/market_chart",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let base = serve(router).await;

        let client = MarketClient::with_base_url(base).unwrap();
        let err = client
            .fetch_price_history("bitcoin", 7, "usd")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Network(_)));
    }

    #[tokio::test]
    async fn empty_prices_is_tagged_empty() {
        let base = serve(chart_route(json!({ "prices": [] }))).await;

        let client = MarketClient::with_base_url(base).unwrap();
        let err = client
            .fetch_price_history("bitcoin", 7, "usd")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Empty));
    }

    #[tokio::test]
    async fn missing_prices_key_is_tagged_malformed() {
        let base = serve(chart_route(json!({ "candles": [[0, 1.0]] }))).await;

        let client = MarketClient::with_base_url(base).unwrap();
        let err = client
            .fetch_price_history("bitcoin", 7, "usd")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }

    #[tokio::test]
    async fn out_of_range_days_is_rejected_locally() {
        // No server needed: validation happens before the request is sent.
        let client = MarketClient::with_base_url("http://127.0.0.1:9").unwrap();

        let err = client
            .fetch_price_history("bitcoin", 0, "usd")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidDays(0)));

        let err = client
            .fetch_price_history("bitcoin", MAX_DAYS + 1, "usd")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidDays(n) if n == MAX_DAYS + 1));
    }

    #[tokio::test]
    async fn top_coins_parses_listing() {
        let router = Router::new().route(
            "/coins/markets",
            get(|| async {
                Json(json!([
                    { "id": "bitcoin", "symbol": "btc", "name": "Bitcoin", "market_cap": 1 },
                    { "id": "ethereum", "symbol": "eth", "name": "Ethereum", "market_cap": 2 },
                ]))
            }),
        );
        let base = serve(router).await;

        let client = MarketClient::with_base_url(base).unwrap();
        let coins = client.fetch_top_coins(2).await.unwrap();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins[0].id, "bitcoin");
        assert_eq!(coins[1].symbol, "eth");
    }

    #[tokio::test]
    async fn empty_listing_is_tagged_empty() {
        let router = Router::new().route("/coins/markets", get(|| async { Json(json!([])) }));
        let base = serve(router).await;

        let client = MarketClient::with_base_url(base).unwrap();
        let err = client.fetch_top_coins(5).await.unwrap_err();
        assert!(matches!(err, FetchError::Empty));
    }

    #[test]
    fn keyword_matching_is_case_insensitive() {
        let coin = CoinSummary {
            id: "bitcoin".into(),
            symbol: "btc".into(),
            name: "Bitcoin".into(),
        };
        assert!(coin.matches(""));
        assert!(coin.matches("bit"));
        assert!(coin.matches("BTC"));
        assert!(!coin.matches("doge"));
        assert_eq!(coin.label(), "Bitcoin (BTC)");
    }
}
