use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::models::CurrencyCode;

/// Environment variable that overrides `sources.exchangerate_api_key`.
pub const EXCHANGERATE_API_KEY_ENV: &str = "EXCHANGERATE_API_KEY";

const CONFIG_FILE_NAME: &str = "ratekeep.toml";

fn default_base_currency() -> String {
    "USD".to_string()
}

/// Rate freshness and update cadence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RatesConfig {
    /// How often the scheduler runs an update cycle.
    #[serde(with = "crate::duration::human")]
    pub update_interval: Duration,

    /// How old a cached rate can be before lookups reject it.
    #[serde(with = "crate::duration::human")]
    pub ttl: Duration,

    /// Maximum number of history records kept.
    pub history_limit: usize,

    /// Default age cutoff for `prune-history`.
    #[serde(with = "crate::duration::human")]
    pub history_retention: Duration,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(15 * 60),
            ttl: Duration::from_secs(5 * 60),
            history_limit: 1000,
            history_retention: Duration::from_secs(30 * 24 * 60 * 60),
        }
    }
}

/// Upstream HTTP request policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Per-attempt timeout.
    #[serde(with = "crate::duration::human")]
    pub timeout: Duration,

    pub max_attempts: u32,

    /// Base delay after a transient failure; doubles on each further attempt.
    #[serde(with = "crate::duration::human")]
    pub retry_delay: Duration,

    /// Wait after an HTTP 429 before trying again.
    #[serde(with = "crate::duration::human")]
    pub rate_limit_cooldown: Duration,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_delay: Duration::from_secs(2),
            rate_limit_cooldown: Duration::from_secs(10),
        }
    }
}

/// Which upstream sources are consulted, and for which currencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub coingecko: bool,
    pub exchangerate: bool,
    pub frankfurter: bool,

    /// Use the built-in offline rate table.
    pub mock: bool,

    /// Prefer the `EXCHANGERATE_API_KEY` environment variable over this.
    pub exchangerate_api_key: Option<String>,

    /// Crypto tickers fetched from CoinGecko.
    pub crypto: Vec<String>,

    /// Fiat codes fetched from ExchangeRate-API / Frankfurter.
    pub fiat: Vec<String>,

    /// Base URL overrides, mainly for pointing at a local mock server.
    pub coingecko_url: Option<String>,
    pub exchangerate_url: Option<String>,
    pub frankfurter_url: Option<String>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            coingecko: true,
            exchangerate: true,
            frankfurter: false,
            mock: false,
            exchangerate_api_key: None,
            crypto: ["BTC", "ETH", "SOL", "BNB", "XRP"]
                .map(String::from)
                .to_vec(),
            fiat: ["EUR", "GBP", "RUB", "JPY", "CNY"]
                .map(String::from)
                .to_vec(),
            coingecko_url: None,
            exchangerate_url: None,
            frankfurter_url: None,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path to data directory. If relative, resolved from config file location.
    /// If not specified, defaults to `data/` next to the config file.
    pub data_dir: Option<PathBuf>,

    /// Currency that wallets are valued and traded against.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    pub rates: RatesConfig,
    pub request: RequestConfig,
    pub sources: SourcesConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            base_currency: default_base_currency(),
            rates: RatesConfig::default(),
            request: RequestConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.request.max_attempts < 1 {
            bail!("request.max_attempts must be at least 1");
        }
        if self.rates.update_interval.is_zero() {
            bail!("rates.update_interval must be greater than zero");
        }
        if self.rates.ttl.is_zero() {
            bail!("rates.ttl must be greater than zero");
        }
        if self.rates.history_limit < 1 {
            bail!("rates.history_limit must be at least 1");
        }
        CurrencyCode::parse(&self.base_currency).context("Invalid base_currency")?;
        Ok(())
    }

    /// Resolve the data directory path.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.join("data"),
        }
    }
}

/// Loaded and validated configuration with resolved paths and parsed codes.
#[derive(Debug)]
pub struct ResolvedConfig {
    pub data_dir: PathBuf,
    pub base_currency: CurrencyCode,
    pub rates: RatesConfig,
    pub request: RequestConfig,
    pub sources: SourcesConfig,
    pub crypto: Vec<CurrencyCode>,
    pub fiat: Vec<CurrencyCode>,
    pub exchangerate_api_key: Option<SecretString>,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./ratekeep.toml` if it exists in current directory
/// 2. `~/.local/share/ratekeep/ratekeep.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from(CONFIG_FILE_NAME);
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("ratekeep").join(CONFIG_FILE_NAME);
    }

    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        Self::resolve(config, config_dir, std::env::var(EXCHANGERATE_API_KEY_ENV).ok())
    }

    /// Load config, falling back to defaults if the file doesn't exist.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            return Self::load(config_path);
        }

        let config_path = if config_path.is_relative() {
            std::env::current_dir()
                .context("Failed to get current directory")?
                .join(config_path)
        } else {
            config_path.to_path_buf()
        };
        let config_dir = config_path
            .parent()
            .context("Config path has no parent directory")?;

        Self::resolve(
            Config::default(),
            config_dir,
            std::env::var(EXCHANGERATE_API_KEY_ENV).ok(),
        )
    }

    /// Validate `config` and resolve it against `config_dir`. A non-empty
    /// `env_api_key` takes precedence over the key in the file.
    pub fn resolve(config: Config, config_dir: &Path, env_api_key: Option<String>) -> Result<Self> {
        config.validate()?;

        let base_currency = CurrencyCode::parse(&config.base_currency)?;
        let crypto = parse_codes(&config.sources.crypto).context("Invalid sources.crypto")?;
        let fiat = parse_codes(&config.sources.fiat).context("Invalid sources.fiat")?;

        let exchangerate_api_key = env_api_key
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                config
                    .sources
                    .exchangerate_api_key
                    .clone()
                    .filter(|k| !k.trim().is_empty())
            })
            .map(SecretString::from);

        let data_dir = config.resolve_data_dir(config_dir);
        let mut sources = config.sources;
        // The key lives only in `exchangerate_api_key` from here on.
        sources.exchangerate_api_key = None;

        Ok(Self {
            data_dir,
            base_currency,
            rates: config.rates,
            request: config.request,
            sources,
            crypto,
            fiat,
            exchangerate_api_key,
        })
    }
}

fn parse_codes(raw: &[String]) -> Result<Vec<CurrencyCode>> {
    let mut codes: Vec<CurrencyCode> = Vec::with_capacity(raw.len());
    for value in raw {
        let code = CurrencyCode::parse(value)?;
        if !codes.contains(&code) {
            codes.push(code);
        }
    }
    Ok(codes)
}
