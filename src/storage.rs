use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;

// CONFIGURATION

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AppConfig {
    pub vs_currency: String, // e.g., "usd"
    pub days: u32,           // default lookback window
    pub top_limit: u32,      // coins requested from the listing endpoint
    pub cache_ttl_secs: u64, // top-coins cache expiry
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vs_currency: "usd".to_string(),
            days: 7,
            top_limit: 50,
            cache_ttl_secs: 3600,
        }
    }
}

// STORAGE DIRECTORY

pub struct StorageDir {
    // Absolute path to the storage directory (e.g., ".../target/debug/storage")
    pub base_dir: PathBuf,
}

impl StorageDir {
    /// Resolves the storage path relative to the running binary and creates
    /// it up front so save paths never have to check for the folder.
    pub async fn new_relative<P: AsRef<Path>>(relative_path: P) -> anyhow::Result<Self> {
        let exe_path = std::env::current_exe()?;
        let base_dir = exe_path
            .parent()
            .ok_or_else(|| anyhow::anyhow!("Could not find binary directory"))?
            .join(relative_path);
        Self::at(base_dir).await
    }

    pub async fn at<P: AsRef<Path>>(dir: P) -> anyhow::Result<Self> {
        let base_dir = dir.as_ref().to_path_buf();
        if !base_dir.exists() {
            fs::create_dir_all(&base_dir).await?;
        }
        Ok(Self { base_dir })
    }

    /// Writes to a sibling .tmp file first and renames it over the target, so
    /// a crash mid-write leaves the previous contents valid.
    pub async fn write_atomic(&self, file_name: &str, bytes: Vec<u8>) -> anyhow::Result<()> {
        let final_path = self.base_dir.join(file_name);
        let tmp_path = self.base_dir.join(format!("{file_name}.tmp"));

        fs::write(&tmp_path, bytes).await?;
        fs::rename(tmp_path, final_path).await?;
        Ok(())
    }

    pub async fn save_json<T: Serialize>(&self, name: &str, data: &T) -> anyhow::Result<()> {
        let json_bytes = serde_json::to_vec_pretty(data)?;
        self.write_atomic(&format!("{name}.json"), json_bytes).await
    }

    pub async fn load_json<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        let content = fs::read(self.base_dir.join(format!("{name}.json"))).await?;
        let data = serde_json::from_slice(&content)?;
        Ok(data)
    }

    /// Loads config.json, falling back to defaults (and writing them out for
    /// the next run) when the file is absent or unreadable.
    pub async fn load_config(&self) -> AppConfig {
        match self.load_json("config").await {
            Ok(config) => config,
            Err(err) => {
                log::debug!("config.json not loaded ({err}); using defaults");
                let config = AppConfig::default();
                if let Err(err) = self.save_json("config", &config).await {
                    log::warn!("could not write default config.json: {err}");
                }
                config
            }
        }
    }
}
