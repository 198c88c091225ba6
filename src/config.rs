use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub paging: PagingConfig,
  #[serde(default)]
  pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  pub base_url: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  15
}

impl ApiConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PagingConfig {
  #[serde(default = "default_page_size")]
  pub page_size: u32,
  /// Delay before a loaded page is appended. Unset means the caller
  /// commits explicitly when its load-more animation finishes.
  pub settle_delay_ms: Option<u64>,
}

fn default_page_size() -> u32 {
  10
}

impl Default for PagingConfig {
  fn default() -> Self {
    Self {
      page_size: default_page_size(),
      settle_delay_ms: None,
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
  /// Entity cache database (default: $XDG_DATA_HOME/shopsync/cache.db)
  pub cache_path: Option<PathBuf>,
  /// Durable key-value database (default: $XDG_DATA_HOME/shopsync/kv.db)
  pub kv_path: Option<PathBuf>,
}

impl StorageConfig {
  pub fn cache_path(&self) -> Result<PathBuf> {
    match &self.cache_path {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("cache.db")),
    }
  }

  pub fn kv_path(&self) -> Result<PathBuf> {
    match &self.kv_path {
      Some(p) => Ok(p.clone()),
      None => Ok(data_dir()?.join("kv.db")),
    }
  }
}

/// Application data directory, also used for log files.
pub fn data_dir() -> Result<PathBuf> {
  let data_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?;

  Ok(data_dir.join("shopsync"))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./shopsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/shopsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/shopsync/config.yaml"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("shopsync.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("shopsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  /// Get the API token for a fresh login from the environment.
  ///
  /// Checks SHOPSYNC_TOKEN.
  pub fn get_api_token() -> Result<String> {
    std::env::var("SHOPSYNC_TOKEN")
      .map_err(|_| eyre!("API token not found. Set SHOPSYNC_TOKEN environment variable."))
  }

  /// Get the refresh token issued with the API token, if any.
  /// Checks SHOPSYNC_REFRESH_TOKEN.
  pub fn get_refresh_token() -> Option<String> {
    std::env::var("SHOPSYNC_REFRESH_TOKEN")
      .ok()
      .filter(|token| !token.is_empty())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_minimal_config_uses_defaults() {
    let config = Config::parse("api:\n  base_url: https://shop.example.com/api/\n").unwrap();
    assert_eq!(config.api.timeout(), Duration::from_secs(15));
    assert_eq!(config.paging.page_size, 10);
    assert_eq!(config.paging.settle_delay_ms, None);
    assert!(config.storage.cache_path.is_none());
  }

  #[test]
  fn test_full_config() {
    let config = Config::parse(
      r#"
api:
  base_url: http://localhost:8080/
  timeout_secs: 3
paging:
  page_size: 20
  settle_delay_ms: 300
storage:
  cache_path: /tmp/cache.db
  kv_path: /tmp/kv.db
"#,
    )
    .unwrap();
    assert_eq!(config.paging.page_size, 20);
    assert_eq!(config.paging.settle_delay_ms, Some(300));
    assert_eq!(
      config.storage.kv_path().unwrap(),
      PathBuf::from("/tmp/kv.db")
    );
  }
}
