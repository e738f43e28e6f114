// Core trading logic modules

pub mod grid_engine;
pub mod indicators;
pub mod precision;
pub mod retry;
pub mod runner;
pub mod state;
pub mod types;

// Re-export commonly used types
pub use grid_engine::{CycleOutcome, GridEngine, ResetReason};
pub use retry::RetryPolicy;
pub use runner::{GridRunner, RunStats};
pub use state::{Entry, GridLevel, GridState};
pub use types::{InstrumentSpec, OpenOrder, OrderRecord, OrderStatus, Side, Ticker};
