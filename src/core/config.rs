use crate::core::error::ConfigError;
use crate::core::method::{
    DEFAULT_OUTLIER_BOUNDS, DEFAULT_WEIGHTS, MethodWeights, OutlierBounds,
};
use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

/// One row of a portfolio or basket: the ticker, its share of the basket and
/// optional per-security method weights.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub share: Option<f64>,
    pub weights: Option<MethodWeights>,
}

impl Holding {
    pub fn new(ticker: &str) -> Self {
        Self {
            ticker: ticker.to_string(),
            share: None,
            weights: None,
        }
    }
}

/// A list of stocks to value individually.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Portfolio {
    pub name: String,
    /// CSV membership file, relative to the config file.
    pub file: Option<String>,
    #[serde(default)]
    pub holdings: Vec<Holding>,
}

/// A fund valued bottom-up from its members.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Basket {
    pub name: String,
    pub file: Option<String>,
    #[serde(default)]
    pub members: Vec<Holding>,
}

/// Named member list after loading; a load failure fails only this entry.
#[derive(Debug, Clone)]
pub struct Membership {
    pub name: String,
    pub members: Result<Vec<Holding>, ConfigError>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct YahooProviderConfig {
    pub base_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProvidersConfig {
    pub yahoo: Option<YahooProviderConfig>,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        ProvidersConfig {
            yahoo: Some(YahooProviderConfig {
                base_url: "https://query1.finance.yahoo.com".to_string(),
            }),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FetchConfig {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Bound on cached tickers; unbounded when absent.
    pub cache_capacity: Option<usize>,
}

impl FetchConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            delay_ms: default_delay_ms(),
            cache_capacity: None,
        }
    }
}

fn default_max_workers() -> usize {
    10
}

fn default_delay_ms() -> u64 {
    100
}

fn default_currency() -> String {
    "EUR".to_string()
}

fn default_weights() -> MethodWeights {
    DEFAULT_WEIGHTS
}

fn default_outlier_bounds() -> OutlierBounds {
    DEFAULT_OUTLIER_BOUNDS
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Target ticker to its peer tickers.
    #[serde(default)]
    pub peers: BTreeMap<String, Vec<String>>,
    #[serde(default = "default_weights")]
    pub default_weights: MethodWeights,
    #[serde(default = "default_outlier_bounds")]
    pub outlier_bounds: OutlierBounds,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub portfolios: Vec<Portfolio>,
    #[serde(default)]
    pub baskets: Vec<Basket>,
    #[serde(default)]
    pub providers: ProvidersConfig,
    /// Directory relative membership files resolve against.
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("org", "fairval", "fairval")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let mut config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config file: {}", path.as_ref().display()))?;
        config.base_dir = path.as_ref().parent().map(|p| p.to_path_buf());
        debug!("Successfully loaded config");
        Ok(config)
    }

    /// Rejects settings no run can work with. Per-row problems are reported later,
    /// against the portfolio or basket they belong to.
    pub fn validate(&self) -> Result<()> {
        if self.fetch.max_workers == 0 {
            bail!("fetch.max_workers must be at least 1");
        }
        if self.fetch.cache_capacity == Some(0) {
            bail!("fetch.cache_capacity must be at least 1 when set");
        }
        for (method, bound) in self.outlier_bounds.iter() {
            if !bound.is_finite() || *bound <= 0.0 {
                bail!(
                    "outlier_bounds.{} must be a positive number, got {bound}",
                    method.key()
                );
            }
        }
        if let Some((method, weight)) = self.default_weights.first_invalid() {
            bail!(
                "default_weights.{} must be finite and non-negative, got {weight}",
                method.key()
            );
        }
        if self.currency.trim().is_empty() {
            bail!("currency must not be empty");
        }
        Ok(())
    }

    pub fn resolve_path(&self, file: &str) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.join(file),
            None => PathBuf::from(file),
        }
    }

    pub fn yahoo_base_url(&self) -> &str {
        self.providers
            .yahoo
            .as_ref()
            .map_or("https://query1.finance.yahoo.com", |p| &p.base_url)
    }
}
