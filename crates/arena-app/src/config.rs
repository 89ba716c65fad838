//! Configuration loading for sats-arena.
//!
//! One struct populated at startup from a TOML file with `SATS_ARENA_*`
//! environment overrides. Production validation fails fast on missing
//! secrets rather than limping along with a disabled payment pipeline.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use arena_engine::EngineConfig;
use arena_lightning::LnbitsConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub environment: Environment,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub lnbits: LnbitsSettings,

    #[serde(default)]
    pub price: PriceConfig,

    #[serde(default)]
    pub game: GameConfig,

    #[serde(default)]
    pub cors: CorsConfig,

    #[serde(default)]
    pub admin: AdminConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub address: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Externally reachable base URL (LNURL QR codes embed it).
    pub public_url: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_bind_address(),
            port: default_port(),
            public_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Remote keyed-store URL. Required in production; dev runs the
    /// bounded in-process cache.
    pub url: Option<String>,
    /// Entry cap for the in-process cache.
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    /// Expired-entry sweep cadence in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            url: None,
            capacity: default_cache_capacity(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LnbitsSettings {
    #[serde(default = "default_lnbits_url")]
    pub url: String,
    pub api_key: Option<String>,
    pub admin_key: Option<String>,
    /// Shared secret for webhook HMAC verification.
    pub webhook_secret: Option<String>,
    /// Public URL the backend should deliver webhooks to.
    pub webhook_url: Option<String>,
    #[serde(default = "default_lightning_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_lnurl_timeout_ms")]
    pub lnurl_timeout_ms: u64,
}

impl Default for LnbitsSettings {
    fn default() -> Self {
        Self {
            url: default_lnbits_url(),
            api_key: None,
            admin_key: None,
            webhook_secret: None,
            webhook_url: None,
            timeout_ms: default_lightning_timeout_ms(),
            lnurl_timeout_ms: default_lnurl_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceConfig {
    /// Ticker URL; the built-in default is used when unset.
    pub url: Option<String>,
    /// Static BTC/USD price used when the feed keeps failing.
    pub fallback_usd: Option<f64>,
    #[serde(default = "default_price_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PriceConfig {
    fn default() -> Self {
        Self {
            url: None,
            fallback_usd: None,
            timeout_ms: default_price_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i64,
    #[serde(default = "default_attempt_cost_usd")]
    pub attempt_cost_usd: f64,
    #[serde(default = "default_buy_in_sats")]
    pub buy_in_sats: i64,
    #[serde(default = "default_house_fee")]
    pub house_fee: f64,
    #[serde(default = "default_true")]
    pub require_attempt_handle: bool,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            attempt_cost_usd: default_attempt_cost_usd(),
            buy_in_sats: default_buy_in_sats(),
            house_fee: default_house_fee(),
            require_attempt_handle: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CorsConfig {
    /// Exact allowed origins (the frontend URL, typically).
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdminConfig {
    /// One-time admin bootstrap secret.
    pub bootstrap_secret: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "text" or "json".
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_db_path() -> PathBuf {
    PathBuf::from("arena.db")
}

fn default_cache_capacity() -> usize {
    100_000
}

fn default_sweep_interval() -> u64 {
    60
}

fn default_lnbits_url() -> String {
    "https://legend.lnbits.com".to_string()
}

fn default_lightning_timeout_ms() -> u64 {
    10_000
}

fn default_lnurl_timeout_ms() -> u64 {
    5_000
}

fn default_price_timeout_ms() -> u64 {
    5_000
}

fn default_max_attempts() -> i64 {
    3
}

fn default_attempt_cost_usd() -> f64 {
    0.01
}

fn default_buy_in_sats() -> i64 {
    1_000
}

fn default_house_fee() -> f64 {
    0.02
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration with environment variable overrides applied.
    pub fn from_file_with_env(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply `SATS_ARENA_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SATS_ARENA_ENVIRONMENT") {
            if val.eq_ignore_ascii_case("production") {
                self.environment = Environment::Production;
            } else if val.eq_ignore_ascii_case("development") {
                self.environment = Environment::Development;
            }
        }
        if let Ok(val) = std::env::var("SATS_ARENA_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = std::env::var("SATS_ARENA_PUBLIC_URL") {
            self.server.public_url = Some(val);
        }
        if let Ok(val) = std::env::var("SATS_ARENA_DATABASE_PATH") {
            self.database.path = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("SATS_ARENA_CACHE_URL") {
            self.cache.url = Some(val);
        }
        if let Ok(val) = std::env::var("SATS_ARENA_FRONTEND_URL") {
            self.cors.allowed_origins = vec![val];
        }
        if let Ok(val) = std::env::var("SATS_ARENA_LNBITS_URL") {
            self.lnbits.url = val;
        }
        if let Ok(val) = std::env::var("SATS_ARENA_LNBITS_API_KEY") {
            self.lnbits.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("SATS_ARENA_LNBITS_ADMIN_KEY") {
            self.lnbits.admin_key = Some(val);
        }
        if let Ok(val) = std::env::var("SATS_ARENA_WEBHOOK_SECRET") {
            self.lnbits.webhook_secret = Some(val);
        }
        if let Ok(val) = std::env::var("SATS_ARENA_WEBHOOK_URL") {
            self.lnbits.webhook_url = Some(val);
        }
        if let Ok(val) = std::env::var("SATS_ARENA_LIGHTNING_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.lnbits.timeout_ms = ms;
            }
        }
        if let Ok(val) = std::env::var("SATS_ARENA_ATTEMPT_COST_USD") {
            if let Ok(usd) = val.parse() {
                self.game.attempt_cost_usd = usd;
            }
        }
        if let Ok(val) = std::env::var("SATS_ARENA_BTC_FALLBACK_PRICE") {
            if let Ok(usd) = val.parse() {
                self.price.fallback_usd = Some(usd);
            }
        }
        if let Ok(val) = std::env::var("SATS_ARENA_ADMIN_BOOTSTRAP_SECRET") {
            self.admin.bootstrap_secret = Some(val);
        }
        if let Ok(val) = std::env::var("SATS_ARENA_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("SATS_ARENA_LOG_FORMAT") {
            self.logging.format = val;
        }
    }

    /// Validate the configuration. Production refuses to start without
    /// the secrets the payment pipeline depends on.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.environment == Environment::Production {
            if self.lnbits.webhook_secret.is_none() {
                anyhow::bail!("production requires lnbits.webhook_secret");
            }
            if self.lnbits.api_key.is_none() {
                anyhow::bail!("production requires lnbits.api_key");
            }
            if self.cache.url.is_none() {
                anyhow::bail!("production requires cache.url");
            }
        }

        if !(0.0..1.0).contains(&self.game.house_fee) {
            anyhow::bail!("game.house_fee must be in [0, 1)");
        }
        if self.game.attempt_cost_usd <= 0.0 {
            anyhow::bail!("game.attempt_cost_usd must be positive");
        }
        if self.game.max_attempts < 1 || self.game.max_attempts > 3 {
            anyhow::bail!("game.max_attempts must be between 1 and 3");
        }
        if self.game.buy_in_sats <= 0 {
            anyhow::bail!("game.buy_in_sats must be positive");
        }
        if self.lnbits.timeout_ms == 0 || self.lnbits.lnurl_timeout_ms == 0 {
            anyhow::bail!("lightning timeouts must be positive");
        }

        Ok(())
    }

    /// Production default: $5 attempts. Dev keeps the penny price.
    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            game: GameConfig {
                attempt_cost_usd: 5.0,
                ..GameConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_attempts: self.game.max_attempts,
            attempt_cost_usd: self.game.attempt_cost_usd,
            buy_in_sats: self.game.buy_in_sats,
            house_fee: self.game.house_fee,
            require_attempt_handle: self.game.require_attempt_handle,
            ..EngineConfig::default()
        }
    }

    pub fn lnbits_config(&self) -> LnbitsConfig {
        LnbitsConfig {
            base_url: self.lnbits.url.clone(),
            api_key: self.lnbits.api_key.clone().unwrap_or_default(),
            admin_key: self.lnbits.admin_key.clone(),
            timeout: Duration::from_millis(self.lnbits.timeout_ms),
            lnurl_timeout: Duration::from_millis(self.lnbits.lnurl_timeout_ms),
            webhook_url: self.lnbits.webhook_url.clone(),
        }
    }

    /// Generate a sample configuration file.
    pub fn sample_config() -> String {
        toml::to_string_pretty(&Self::default()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid_dev() {
        let config = AppConfig::default();
        assert_eq!(config.environment, Environment::Development);
        config.validate().unwrap();
    }

    #[test]
    fn production_requires_secrets() {
        let mut config = AppConfig::production();
        assert!(config.validate().is_err());

        config.lnbits.webhook_secret = Some("secret".into());
        assert!(config.validate().is_err());
        config.lnbits.api_key = Some("key".into());
        assert!(config.validate().is_err());
        config.cache.url = Some("redis://localhost".into());
        config.validate().unwrap();
    }

    #[test]
    fn bounds_are_checked() {
        let mut config = AppConfig::default();
        config.game.house_fee = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.game.max_attempts = 4;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.game.attempt_cost_usd = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn sample_config_roundtrips() {
        let sample = AppConfig::sample_config();
        assert!(sample.contains("[server]"));
        assert!(sample.contains("[game]"));
        let parsed: AppConfig = toml::from_str(&sample).unwrap();
        parsed.validate().unwrap();
    }
}
