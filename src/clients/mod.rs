// Exchange access layer

pub mod kucoin_auth;
pub mod kucoin_rest;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::core::types::{InstrumentSpec, OpenOrder, OrderRecord, Side, Ticker};
use crate::error::TradingResult;

pub use kucoin_auth::KucoinAuth;
pub use kucoin_rest::{KucoinClient, RateLimiter};

/// Typed exchange operations for the configured symbol.
///
/// The grid engine only talks to the exchange through this trait, so tests
/// can drive it with an in-memory implementation.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Best bid and ask
    async fn fetch_ticker(&self) -> TradingResult<Ticker>;

    /// Price and quantity increments for the symbol
    async fn fetch_instrument_spec(&self) -> TradingResult<InstrumentSpec>;

    /// Up to `limit` close prices, oldest first
    async fn fetch_recent_closes(&self, limit: usize) -> TradingResult<Vec<Decimal>>;

    async fn list_open_orders(&self) -> TradingResult<Vec<OpenOrder>>;

    /// Place a GTC limit order tagged with `client_oid` and return the
    /// exchange order id. Never retried.
    async fn place_limit_order(
        &self,
        client_oid: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> TradingResult<String>;

    /// Order previously placed with `client_oid`, in any state, or `None`
    /// when the exchange has no such order.
    async fn find_order_by_client_oid(&self, client_oid: &str) -> TradingResult<Option<OrderRecord>>;

    async fn get_order_status(&self, order_id: &str) -> TradingResult<OrderRecord>;

    async fn cancel_order(&self, order_id: &str) -> TradingResult<()>;

    /// List then cancel each open order, returning how many were cancelled.
    /// Stops at the first failure; the caller must re-list before assuming
    /// nothing is resting.
    async fn cancel_all_open_orders(&self) -> TradingResult<usize> {
        let orders = self.list_open_orders().await?;
        let mut cancelled = 0;
        for order in &orders {
            if let Err(e) = self.cancel_order(&order.order_id).await {
                warn!(
                    order_id = %order.order_id,
                    cancelled,
                    remaining = orders.len() - cancelled,
                    error = %e,
                    "Cancel-all interrupted"
                );
                return Err(e);
            }
            cancelled += 1;
        }
        if cancelled > 0 {
            info!(cancelled, "🧹 Cancelled open orders");
        }
        Ok(cancelled)
    }
}
