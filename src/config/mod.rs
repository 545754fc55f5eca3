use crate::cache::{StoreConfig, DEFAULT_MAX_AGE_DAYS};
use crate::query::{DEFAULT_API_HOST, DEFAULT_BASE_URL};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Environment variable holding the RapidAPI key.
pub const API_KEY_ENV: &str = "X_RAPID_API_KEY";

const CACHE_DIR_NAME: &str = "netflixRoulette";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Configuration {
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
    pub api: Option<ApiConfig>,
    pub cache: Option<CacheConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(rename = "baseUrl")]
    pub base_url: Option<String>,
    pub host: Option<String>,
    #[serde(rename = "timeoutSeconds")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    pub directory: Option<String>,
    #[serde(rename = "maxAgeDays")]
    pub max_age_days: Option<i64>,
}

impl Configuration {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        let config: Configuration = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Read `path` if it exists, otherwise fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if Path::new(path).exists() {
            Self::from_file(path).with_context(|| format!("invalid configuration file {}", path))
        } else {
            info!("No configuration file at {}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// The API key from the environment, falling back to the config file.
    pub fn api_key(&self) -> Option<String> {
        let from_env = std::env::var(API_KEY_ENV).ok();
        pick_api_key(from_env.as_deref(), self.api_key.as_deref())
    }

    pub fn base_url(&self) -> anyhow::Result<String> {
        let base_url = self
            .api
            .as_ref()
            .and_then(|a| a.base_url.clone())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        url::Url::parse(&base_url).with_context(|| format!("invalid API base URL {}", base_url))?;
        Ok(base_url)
    }

    pub fn api_host(&self) -> String {
        self.api
            .as_ref()
            .and_then(|a| a.host.clone())
            .unwrap_or_else(|| DEFAULT_API_HOST.to_string())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.api
                .as_ref()
                .and_then(|a| a.timeout_seconds)
                .unwrap_or(30),
        )
    }

    pub fn max_age_days(&self) -> i64 {
        self.cache
            .as_ref()
            .and_then(|c| c.max_age_days)
            .unwrap_or(DEFAULT_MAX_AGE_DAYS)
    }

    pub fn cache_directory(&self) -> anyhow::Result<PathBuf> {
        let home = directories::UserDirs::new().map(|dirs| dirs.home_dir().to_path_buf());
        let configured = self.cache.as_ref().and_then(|c| c.directory.as_deref());
        resolve_cache_directory(configured, home.as_deref())
    }

    pub fn store_config(&self) -> anyhow::Result<StoreConfig> {
        Ok(StoreConfig::new(self.cache_directory()?).with_max_age_days(self.max_age_days()))
    }
}

fn pick_api_key(from_env: Option<&str>, from_config: Option<&str>) -> Option<String> {
    [from_env, from_config]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|key| !key.is_empty())
        .map(str::to_string)
}

fn resolve_cache_directory(configured: Option<&str>, home: Option<&Path>) -> anyhow::Result<PathBuf> {
    match configured {
        Some(dir) => match dir.strip_prefix("~/") {
            Some(rest) => {
                let home = home.context("cannot expand '~' without a home directory")?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(dir)),
        },
        None => {
            let home = home.context("could not determine the home directory")?;
            Ok(home.join(CACHE_DIR_NAME))
        }
    }
}
