use crate::core::request::ScreenParams;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf};
use tracing::debug;

pub const DEFAULT_YAHOO_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct YahooProviderConfig {
    pub base_url: String,
    /// Page that hands out the session cookie used to obtain a crumb.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cookie_url: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: DEFAULT_YAHOO_BASE_URL.to_string(),
                cookie_url: None,
            }),
        }
    }
}

/// Default form values for a screen; command line flags override them.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ScreenDefaults {
    #[serde(default = "default_tickers")]
    pub tickers: Vec<String>,
    #[serde(flatten)]
    pub params: ScreenParams,
}

fn default_tickers() -> Vec<String> {
    ["AAPL", "MSFT", "KO", "TSLA"]
        .iter()
        .map(|t| t.to_string())
        .collect()
}

impl Default for ScreenDefaults {
    fn default() -> Self {
        ScreenDefaults {
            tickers: default_tickers(),
            params: ScreenParams::default(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub screen: ScreenDefaults,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_max_concurrent_fetches() -> usize {
    8
}

fn default_cache_ttl_secs() -> u64 {
    15 * 60
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            providers: ProvidersConfig::default(),
            screen: ScreenDefaults::default(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, or built-in defaults when
    /// no config file has been created yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(
                "No config at {}, using built-in defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("in", "pegy", "pegy")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .screen
            .params
            .validate()
            .with_context(|| format!("Invalid screen defaults in {}", path.as_ref().display()))?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn yahoo_cookie_url(&self) -> Option<&str> {
        self.providers
            .yahoo
            .as_ref()
            .and_then(|p| p.cookie_url.as_deref())
    }

    pub fn yahoo_base_url(&self) -> &str {
        self.providers
            .yahoo
            .as_ref()
            .map_or(DEFAULT_YAHOO_BASE_URL, |p| &p.base_url)
    }
}
