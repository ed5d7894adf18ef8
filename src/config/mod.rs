pub mod device_config;
pub mod timing_config;

use std::path::Path;

use anyhow::Result;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::utils::ensure_directory_exists;

pub use device_config::DeviceConfig;
pub use timing_config::TimingConfig;

pub const CONFIG_FILE_NAME: &str = "genial_t31.json";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub timing: TimingConfig,
}

impl AppConfig {
    /// Loads the config from `path`, falling back to defaults if the file does not exist.
    pub async fn load_config(path: &Path) -> Result<Self> {
        let file_path_str = path.to_string_lossy().into_owned();

        if !path.exists() {
            warn!("Config file not found at {:?}, using default.", file_path_str);
            return Ok(Self::default());
        }

        let config_json = fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&config_json)?;

        info!("Config loaded from {:?}", file_path_str);
        Ok(config)
    }

    /// Saves the config to `path`, creating the parent directory if needed.
    pub async fn save_config(&self, path: &Path) -> Result<()> {
        if let Some(config_dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            ensure_directory_exists(config_dir).await?;
        }

        let file_path_str = path.to_string_lossy().into_owned();
        let config_json = match serde_json::to_string_pretty(&self) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to serialize config to JSON: {}", e);
                return Err(e.into());
            }
        };

        fs::write(path, config_json).await?;
        info!("Config saved to {:?}.", file_path_str);
        Ok(())
    }
}
