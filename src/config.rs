use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::exchange::retry::RetryPolicy;
use crate::exchange::signing::Secret;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Immutable run configuration for one symbol and one ladder.
///
/// `gap_percent` is a fraction: 0.01 places orders 1% away from the
/// average price. Fields a JSON config leaves out are taken from the
/// environment, then from the built-in defaults.
#[derive(Debug, Clone, Deserialize)]
#[serde(default = "GridConfig::from_env")]
pub struct GridConfig {
    pub symbol: String,
    pub api_key: Option<String>,
    pub api_secret: Option<Secret>,
    pub gap_percent: f64,
    pub quantity: f64,
    pub min_price: f64,
    pub min_qty: f64,
    pub max_orders: usize,
    pub host: String,
    pub recv_window: u64,
    pub http_timeout_ms: u64,
    pub http_attempts: u32,
    pub cancel_attempts: u32,
    pub cache_path: Option<String>,
    pub cycle_secs: u64,
    pub error_sleep_secs: u64,
    pub cancel_on_start: bool,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            symbol: "BTCUSDT".to_string(),
            api_key: None,
            api_secret: None,
            gap_percent: 0.01,
            quantity: 0.001,
            min_price: 0.01,
            min_qty: 0.00001,
            max_orders: 3,
            host: "https://api.binance.com".to_string(),
            recv_window: 10_000,
            http_timeout_ms: 5_000,
            http_attempts: 1,
            cancel_attempts: 3,
            cache_path: None,
            cycle_secs: 10,
            error_sleep_secs: 20,
            cancel_on_start: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl GridConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            symbol: std::env::var("SYMBOL").unwrap_or(d.symbol),
            api_key: std::env::var("API_KEY").ok(),
            api_secret: std::env::var("API_SECRET").ok().map(Secret::new),
            gap_percent: env_parse("GAP_PERCENT", d.gap_percent),
            quantity: env_parse("QUANTITY", d.quantity),
            min_price: env_parse("MIN_PRICE", d.min_price),
            min_qty: env_parse("MIN_QTY", d.min_qty),
            max_orders: env_parse("MAX_ORDERS", d.max_orders),
            host: std::env::var("BINANCE_BASE").unwrap_or(d.host),
            recv_window: env_parse("RECV_WINDOW", d.recv_window),
            http_timeout_ms: env_parse("HTTP_TIMEOUT_MS", d.http_timeout_ms),
            http_attempts: env_parse("HTTP_ATTEMPTS", d.http_attempts),
            cancel_attempts: env_parse("CANCEL_ATTEMPTS", d.cancel_attempts),
            cache_path: std::env::var("CACHE_PATH").ok(),
            cycle_secs: env_parse("CYCLE_SECS", d.cycle_secs),
            error_sleep_secs: env_parse("ERROR_SLEEP_SECS", d.error_sleep_secs),
            cancel_on_start: std::env::var("CANCEL_ON_START")
                .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Read a JSON config file. Fields it leaves out fall back to `from_env`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::Invalid("symbol is empty".into()));
        }
        let positive = [
            ("gap_percent", self.gap_percent),
            ("quantity", self.quantity),
            ("min_price", self.min_price),
            ("min_qty", self.min_qty),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::Invalid(format!("{} must be > 0, got {}", name, value)));
            }
        }
        if self.gap_percent >= 1.0 {
            return Err(ConfigError::Invalid(format!(
                "gap_percent is a fraction and must be < 1, got {}",
                self.gap_percent
            )));
        }
        if self.max_orders == 0 {
            return Err(ConfigError::Invalid("max_orders must be >= 1".into()));
        }
        if self.http_timeout_ms == 0 {
            return Err(ConfigError::Invalid("http_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.http_attempts, Duration::from_millis(self.http_timeout_ms))
    }
}
