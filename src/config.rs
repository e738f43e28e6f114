// Configuration management for the grid bot

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::core::indicators::SLOW_EMA_PERIOD;
use crate::core::retry::RetryPolicy;
use crate::error::{ResetPolicy, TradingError, TradingResult};

pub const ENV_API_KEY: &str = "KUCOIN_API_KEY";
pub const ENV_API_SECRET: &str = "KUCOIN_API_SECRET";
pub const ENV_API_PASSPHRASE: &str = "KUCOIN_API_PASSPHRASE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    pub symbol: String,
    #[serde(default = "default_candle_interval")]
    pub candle_interval: String,
    #[serde(default = "default_candle_limit")]
    pub candle_limit: usize,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default)]
    pub api_passphrase: String,
}

impl Credentials {
    pub fn is_complete(&self) -> bool {
        !self.api_key.is_empty() && !self.api_secret.is_empty() && !self.api_passphrase.is_empty()
    }

    /// Environment values take precedence over the file
    fn merge_env(&mut self) {
        if let Ok(v) = std::env::var(ENV_API_KEY) {
            self.api_key = v;
        }
        if let Ok(v) = std::env::var(ENV_API_SECRET) {
            self.api_secret = v;
        }
        if let Ok(v) = std::env::var(ENV_API_PASSPHRASE) {
            self.api_passphrase = v;
        }
    }
}

/// How filled orders are replaced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridMode {
    /// Filled buy becomes a sell at `buy * (1 + profit_percent)`; filled sells are consumed
    TakeProfit,
    /// Any fill is replaced by its mirror one step further out
    Ladder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "default_mode")]
    pub mode: GridMode,
    pub levels: usize,
    pub range_percent: Decimal,
    pub total_risk_budget: Decimal,
    #[serde(default = "default_profit_percent")]
    pub profit_percent: Decimal,
    #[serde(default = "default_stop_loss_percent")]
    pub stop_loss_percent: Decimal,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_fee_rate")]
    pub fee_rate: Decimal,
    #[serde(default = "default_true")]
    pub trend_filter: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bollinger_multiplier: Option<Decimal>,
}

impl GridConfig {
    pub fn idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.idle_timeout_secs as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_retry_delay")]
    pub max_delay_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
        )
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay(),
            backoff_multiplier: default_backoff(),
            max_delay_ms: default_max_retry_delay(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_error_delay")]
    pub error_delay_ms: u64,
    #[serde(default)]
    pub reset_on_error: ResetPolicy,
}

impl RunnerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_delay(&self) -> Duration {
        Duration::from_millis(self.error_delay_ms)
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            error_delay_ms: default_error_delay(),
            reset_on_error: ResetPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self { state_file: default_state_file() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub exchange: ExchangeConfig,
    #[serde(default)]
    pub credentials: Credentials,
    pub grid: GridConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub persistence: PersistenceConfig,
}

// Default value functions
fn default_rest_url() -> String { "https://api.kucoin.com".to_string() }
fn default_candle_interval() -> String { "1min".to_string() }
fn default_candle_limit() -> usize { 100 }
fn default_request_timeout() -> u64 { 10 }
fn default_mode() -> GridMode { GridMode::TakeProfit }
fn default_profit_percent() -> Decimal { dec!(0.005) }
fn default_stop_loss_percent() -> Decimal { dec!(0.015) }
fn default_idle_timeout() -> u64 { 3600 }
fn default_fee_rate() -> Decimal { dec!(0.001) }
fn default_true() -> bool { true }
fn default_max_attempts() -> u32 { 3 }
fn default_retry_delay() -> u64 { 1000 }
fn default_backoff() -> f64 { 1.0 }
fn default_max_retry_delay() -> u64 { 5000 }
fn default_max_requests() -> u32 { 30 }
fn default_window_ms() -> u64 { 3000 }
fn default_poll_interval() -> u64 { 500 }
fn default_error_delay() -> u64 { 5000 }
fn default_state_file() -> PathBuf { PathBuf::from("data/grid_state.json") }

impl Default for Config {
    fn default() -> Self {
        Self {
            exchange: ExchangeConfig {
                rest_url: default_rest_url(),
                symbol: "BTC-USDT".to_string(),
                candle_interval: default_candle_interval(),
                candle_limit: default_candle_limit(),
                request_timeout_secs: default_request_timeout(),
            },
            credentials: Credentials::default(),
            grid: GridConfig {
                mode: default_mode(),
                levels: 10,
                range_percent: dec!(0.05),
                total_risk_budget: dec!(100),
                profit_percent: default_profit_percent(),
                stop_loss_percent: default_stop_loss_percent(),
                idle_timeout_secs: default_idle_timeout(),
                fee_rate: default_fee_rate(),
                trend_filter: true,
                bollinger_multiplier: None,
            },
            retry: RetryConfig::default(),
            rate_limit: RateLimitConfig::default(),
            runner: RunnerConfig::default(),
            persistence: PersistenceConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, merge environment credentials
    /// and validate. Credentials are not required here; trading commands
    /// call [`Config::require_credentials`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> TradingResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            TradingError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;

        let mut config: Config = toml::from_str(&content)?;
        let _ = dotenvy::dotenv();
        config.credentials.merge_env();
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> TradingResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| TradingError::Config(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> TradingResult<()> {
        let grid = &self.grid;

        if self.exchange.symbol.trim().is_empty() {
            return Err(TradingError::Config("exchange.symbol must not be empty".to_string()));
        }
        if self.exchange.candle_limit == 0 {
            return Err(TradingError::Config("candle_limit must be greater than 0".to_string()));
        }
        if grid.trend_filter && self.exchange.candle_limit <= SLOW_EMA_PERIOD {
            return Err(TradingError::Config(format!(
                "candle_limit must exceed {} when trend_filter is enabled",
                SLOW_EMA_PERIOD
            )));
        }
        if grid.levels < 2 {
            return Err(TradingError::Config("grid.levels must be at least 2".to_string()));
        }
        if grid.range_percent <= Decimal::ZERO || grid.range_percent >= Decimal::ONE {
            return Err(TradingError::Config("range_percent must be between 0 and 1".to_string()));
        }
        if grid.total_risk_budget <= Decimal::ZERO {
            return Err(TradingError::Config("total_risk_budget must be positive".to_string()));
        }
        if grid.profit_percent <= Decimal::ZERO {
            return Err(TradingError::Config("profit_percent must be positive".to_string()));
        }
        if grid.stop_loss_percent <= Decimal::ZERO || grid.stop_loss_percent >= Decimal::ONE {
            return Err(TradingError::Config("stop_loss_percent must be between 0 and 1".to_string()));
        }
        if grid.fee_rate < Decimal::ZERO {
            return Err(TradingError::Config("fee_rate must be non-negative".to_string()));
        }
        if matches!(grid.bollinger_multiplier, Some(m) if m <= Decimal::ZERO) {
            return Err(TradingError::Config("bollinger_multiplier must be positive".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(TradingError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        if self.rate_limit.max_requests == 0 {
            return Err(TradingError::Config("rate_limit.max_requests must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Fail fast when trading credentials are missing
    pub fn require_credentials(&self) -> TradingResult<()> {
        let creds = &self.credentials;
        let missing = [
            (ENV_API_KEY, creds.api_key.is_empty()),
            (ENV_API_SECRET, creds.api_secret.is_empty()),
            (ENV_API_PASSPHRASE, creds.api_passphrase.is_empty()),
        ];
        match missing.iter().find(|(_, empty)| *empty) {
            Some((name, _)) => Err(TradingError::ConfigMissing(format!(
                "{} (set it in [credentials] or the environment)",
                name
            ))),
            None => Ok(()),
        }
    }
}
