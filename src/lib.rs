// KuCoin Grid Trading Bot Library
//
// Single-symbol spot grid bot: signed REST gateway, indicator-gated setup,
// fill rotation with PnL accounting and a crash-safe state snapshot.

pub mod clients;
pub mod config;
pub mod core;
pub mod error; // Unified error handling
pub mod persistence;

// Re-export core trading types
pub use self::core::{
    CycleOutcome, GridEngine, GridLevel, GridRunner, GridState, InstrumentSpec, OrderRecord, OrderStatus,
    ResetReason, Side, Ticker,
};

// Re-export error types
pub use error::{ResetPolicy, TradingError, TradingResult};

// Re-export client types
pub use clients::{ExchangeGateway, KucoinAuth, KucoinClient};

// Re-export configuration
pub use config::{Config, GridConfig, GridMode};

pub use persistence::StateStore;
