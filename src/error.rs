//! Unified error handling for the grid bot
//!
//! Every fallible operation in the crate returns [`TradingResult`]. The
//! variants follow the failure taxonomy the run loop acts on: transport
//! failures are retried by the gateway, semantic API errors surface
//! immediately, and order lifecycle errors may force a grid reset.

use std::io;

use serde::{Deserialize, Serialize};

use crate::core::types::OrderStatus;

/// Main error type for the grid bot
#[derive(Debug, thiserror::Error)]
pub enum TradingError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Missing required configuration: {0}")]
    ConfigMissing(String),

    // Transport errors (single attempt, retryable)
    #[error("API connection error: {0}")]
    ApiConnection(String),

    #[error("API timeout: {0}")]
    ApiTimeout(String),

    /// Retries exhausted for a named gateway operation
    #[error("Transport error in {operation} after {attempts} attempt(s): {message}")]
    Transport {
        operation: String,
        attempts: u32,
        message: String,
    },

    /// Non-success status code in the response envelope
    #[error("API error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Malformed response: {0}")]
    Parse(String),

    #[error("Order {order_id} ended as {status:?} before filling")]
    OrderLifecycle { order_id: String, status: OrderStatus },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Which cycle errors force a grid reset in the run loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    Never,
    #[default]
    Lifecycle,
    Always,
}

impl TradingError {
    /// Check if a single failed attempt may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradingError::ApiConnection(_) | TradingError::ApiTimeout(_)
        )
    }

    /// Whether the run loop should cancel everything and rebuild the grid
    pub fn triggers_reset(&self, policy: ResetPolicy) -> bool {
        match policy {
            ResetPolicy::Never => false,
            ResetPolicy::Always => true,
            ResetPolicy::Lifecycle => matches!(self, TradingError::OrderLifecycle { .. }),
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            TradingError::Config(_) | TradingError::ConfigMissing(_) => "config",

            TradingError::ApiConnection(_)
            | TradingError::ApiTimeout(_)
            | TradingError::Transport { .. } => "transport",

            TradingError::Api { .. } | TradingError::SymbolNotFound(_) => "api",

            TradingError::Parse(_) => "parse",

            TradingError::OrderLifecycle { .. } => "order",

            TradingError::Persistence(_) | TradingError::Io(_) => "io",

            TradingError::Internal(_) => "internal",
        }
    }
}

impl From<io::Error> for TradingError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut => TradingError::ApiTimeout(err.to_string()),
            io::ErrorKind::ConnectionRefused => TradingError::ApiConnection(err.to_string()),
            _ => TradingError::Io(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for TradingError {
    fn from(err: serde_json::Error) -> Self {
        TradingError::Parse(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for TradingError {
    fn from(err: toml::de::Error) -> Self {
        TradingError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<reqwest::Error> for TradingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TradingError::ApiTimeout(err.to_string())
        } else if err.is_decode() {
            TradingError::Parse(err.to_string())
        } else {
            TradingError::ApiConnection(err.to_string())
        }
    }
}

impl From<rust_decimal::Error> for TradingError {
    fn from(err: rust_decimal::Error) -> Self {
        TradingError::Parse(format!("decimal error: {}", err))
    }
}

/// Result type alias using TradingError
pub type TradingResult<T> = Result<T, TradingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TradingError::Transport {
            operation: "fetch_ticker".to_string(),
            attempts: 3,
            message: "connection refused".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("fetch_ticker"));
        assert!(msg.contains("3 attempt"));
    }

    #[test]
    fn test_error_category() {
        assert_eq!(TradingError::Config("x".into()).category(), "config");
        assert_eq!(TradingError::ApiTimeout("x".into()).category(), "transport");
        assert_eq!(
            TradingError::Api { code: "400100".into(), message: "bad".into() }.category(),
            "api"
        );
    }

    #[test]
    fn test_retryable() {
        assert!(TradingError::ApiTimeout("t".into()).is_retryable());
        assert!(TradingError::ApiConnection("c".into()).is_retryable());
        assert!(!TradingError::Api { code: "1".into(), message: "m".into() }.is_retryable());
        assert!(!TradingError::Parse("p".into()).is_retryable());
    }

    #[test]
    fn test_reset_policy() {
        let lifecycle = TradingError::OrderLifecycle {
            order_id: "abc".into(),
            status: OrderStatus::Cancelled,
        };
        let transport = TradingError::ApiTimeout("t".into());

        assert!(lifecycle.triggers_reset(ResetPolicy::Lifecycle));
        assert!(!transport.triggers_reset(ResetPolicy::Lifecycle));
        assert!(transport.triggers_reset(ResetPolicy::Always));
        assert!(!lifecycle.triggers_reset(ResetPolicy::Never));
    }

    #[test]
    fn test_io_conversion() {
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        let err: TradingError = io_err.into();
        assert!(err.is_retryable());

        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: TradingError = io_err.into();
        assert!(matches!(err, TradingError::Io(_)));
    }
}
