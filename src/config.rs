use anyhow::{anyhow, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// The structure of our configuration file (config.toml).
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    /// Where downloaded media files and `download_history.jsonl` live.
    pub download_directory: String,
    /// Root of the per-domain raw-response audit dumps.
    #[serde(default = "default_log_directory")]
    pub log_directory: String,
}

fn default_log_directory() -> String {
    "logs".to_string()
}

impl Default for Config {
    fn default() -> Self {
        // The user's download folder where available, "downloads" otherwise.
        let default_dir = UserDirs::new()
            .and_then(|dirs| dirs.download_dir().map(|p| p.to_string_lossy().to_string()))
            .unwrap_or_else(|| "downloads".to_string());

        Config {
            download_directory: default_dir,
            log_directory: default_log_directory(),
        }
    }
}

/// Returns the cross-platform path to the configuration file, creating the
/// directory if needed.
async fn get_config_path() -> Result<PathBuf> {
    let project_dirs = ProjectDirs::from("com", "MediaDump", "Media-Video-Dump")
        .ok_or_else(|| anyhow!("Could not find a valid home directory to store config"))?;

    let config_dir = project_dirs.config_dir();
    fs::create_dir_all(config_dir).await?;

    Ok(config_dir.join("config.toml"))
}

/// Loads the configuration from the file, or creates a default one if it
/// doesn't exist.
pub async fn load_config() -> Result<Config> {
    let config_path = get_config_path().await?;

    if !config_path.exists() {
        tracing::info!(
            "No config file found. Creating a default one at: {}",
            config_path.display()
        );
        let default_config = Config::default();
        save_config(&default_config).await?;
        return Ok(default_config);
    }

    let config_content = fs::read_to_string(&config_path).await?;
    let config: Config = toml::from_str(&config_content)
        .map_err(|e| anyhow!("Failed to parse config file at {}: {}", config_path.display(), e))?;

    Ok(config)
}

/// Saves the provided configuration object to the file.
pub async fn save_config(config: &Config) -> Result<()> {
    let config_path = get_config_path().await?;
    let toml_string = toml::to_string_pretty(config)?;
    fs::write(config_path, toml_string).await?;
    Ok(())
}
