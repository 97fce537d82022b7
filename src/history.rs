use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::storage::StorageDir;

pub const HISTORY_FILE: &str = "history.csv";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Buy,
    Sell,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Buy => write!(f, "buy"),
            Action::Sell => write!(f, "sell"),
        }
    }
}

/// One flat row per query. `avg_5` stays empty until five samples exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub coin: String,
    pub id: String,
    pub queried_at: DateTime<Utc>,
    pub latest_price: f64,
    pub avg_5: Option<f64>,
    pub action: Action,
}

/// Append-only query log backed by a CSV file in the storage directory.
pub struct HistoryStore {
    dir: StorageDir,
}

impl HistoryStore {
    pub fn new(dir: StorageDir) -> Self {
        Self { dir }
    }

    /// Returns all recorded rows; a missing file is an empty history.
    pub async fn load(&self) -> Result<Vec<HistoryRecord>> {
        let path = self.dir.base_dir.join(HISTORY_FILE);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let mut records = Vec::new();
        for row in reader.deserialize() {
            records.push(row?);
        }
        Ok(records)
    }

    /// Appends one record by rewriting the whole table through the atomic
    /// tmp-then-rename path, so an interrupted write cannot tear existing
    /// rows.
    pub async fn append(&self, record: HistoryRecord) -> Result<()> {
        let mut records = self.load().await?;
        records.push(record);

        let mut writer = csv::Writer::from_writer(Vec::new());
        for record in &records {
            writer.serialize(record)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|err| anyhow::anyhow!("flushing csv buffer: {err}"))?;
        self.dir.write_atomic(HISTORY_FILE, bytes).await
    }
}
