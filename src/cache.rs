use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::market::CoinSummary;

/// Time-boxed memoization for the top-coins listing, one entry per requested
/// limit. Expiry is the only invalidation; there is no capacity bound.
///
/// The cache is a plain value owned by the caller (the app wraps it in a
/// `tokio::sync::Mutex` because the TUI refreshes from a background task).
pub struct CoinListCache {
    ttl: Duration,
    entries: HashMap<u32, CacheEntry>,
}

struct CacheEntry {
    expires_at: Instant,
    coins: Vec<CoinSummary>,
}

impl CoinListCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: HashMap::new(),
        }
    }

    /// Returns the cached listing for this limit if it has not expired.
    pub fn get(&self, limit: u32) -> Option<Vec<CoinSummary>> {
        let entry = self.entries.get(&limit)?;
        if entry.expires_at <= Instant::now() {
            return None;
        }
        Some(entry.coins.clone())
    }

    pub fn put(&mut self, limit: u32, coins: Vec<CoinSummary>) {
        self.entries.insert(
            limit,
            CacheEntry {
                expires_at: Instant::now() + self.ttl,
                coins,
            },
        );
    }
}
