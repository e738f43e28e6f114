// Common test utilities and helpers
#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use kucoin_grid_bot::config::{GridConfig, GridMode};
use kucoin_grid_bot::{
    ExchangeGateway, InstrumentSpec, OrderRecord, OrderStatus, Side, Ticker, TradingError, TradingResult,
};
use kucoin_grid_bot::core::OpenOrder;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

/// Grid settings used by most engine tests: reference 100, ±10 %, four
/// intervals, no trend gate.
pub fn create_test_grid_config() -> GridConfig {
    GridConfig {
        mode: GridMode::TakeProfit,
        levels: 4,
        range_percent: dec!(0.10),
        total_risk_budget: dec!(1000),
        profit_percent: dec!(0.005),
        stop_loss_percent: dec!(0.015),
        idle_timeout_secs: 3600,
        fee_rate: dec!(0.001),
        trend_filter: false,
        bollinger_multiplier: None,
    }
}

/// Create a temporary directory holding the state snapshot path
pub fn create_temp_state_path() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("grid_state.json");
    (temp_dir, path)
}

/// Choppy uptrend: EMA10 above EMA30 with RSI near 54
pub fn choppy_uptrend_closes() -> Vec<Decimal> {
    let mut price = dec!(100);
    (0..60)
        .map(|i| {
            price += if i % 2 == 0 { dec!(1) } else { dec!(-0.8) };
            price
        })
        .collect()
}

pub fn downtrend_closes() -> Vec<Decimal> {
    (0..60).map(|i| dec!(130) - Decimal::from(i) * dec!(0.5)).collect()
}

#[derive(Debug, Clone)]
pub struct MockOrder {
    pub id: String,
    pub client_oid: Option<String>,
    pub side: Side,
    pub price: Decimal,
    pub size: Decimal,
    pub status: OrderStatus,
}

#[derive(Debug)]
struct Inner {
    ticker: Ticker,
    spec: InstrumentSpec,
    closes: Vec<Decimal>,
    orders: Vec<MockOrder>,
    next_id: u64,
    cancelled: Vec<String>,
    fail_next_place: Option<TradingError>,
    calls: HashMap<&'static str, usize>,
}

/// In-memory exchange. Clones share the same book, so a test can keep a
/// handle while the engine owns another.
#[derive(Debug, Clone)]
pub struct MockExchange {
    inner: Arc<Mutex<Inner>>,
}

impl MockExchange {
    pub fn new(bid: Decimal, ask: Decimal) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                ticker: Ticker { bid, ask },
                spec: InstrumentSpec {
                    symbol: "BTC-USDT".to_string(),
                    tick_size: dec!(0.01),
                    lot_precision: 4,
                    min_size: dec!(0.001),
                },
                closes: Vec::new(),
                orders: Vec::new(),
                next_id: 1,
                cancelled: Vec::new(),
                fail_next_place: None,
                calls: HashMap::new(),
            })),
        }
    }

    /// Mid price 100
    pub fn at_100() -> Self {
        Self::new(dec!(99.99), dec!(100.01))
    }

    pub fn set_ticker(&self, bid: Decimal, ask: Decimal) {
        self.inner.lock().unwrap().ticker = Ticker { bid, ask };
    }

    pub fn set_closes(&self, closes: Vec<Decimal>) {
        self.inner.lock().unwrap().closes = closes;
    }

    /// Leave an order on the book that the engine did not place
    pub fn seed_open_order(&self, side: Side, price: Decimal) -> String {
        let mut inner = self.inner.lock().unwrap();
        let id = format!("foreign-{}", inner.next_id);
        inner.next_id += 1;
        inner.orders.push(MockOrder {
            id: id.clone(),
            client_oid: None,
            side,
            price,
            size: dec!(1),
            status: OrderStatus::Active,
        });
        id
    }

    /// Mark the active order resting at `price` as filled
    pub fn fill_at(&self, price: Decimal) -> String {
        self.set_status_at(price, OrderStatus::Done)
    }

    pub fn set_status_at(&self, price: Decimal, status: OrderStatus) -> String {
        let mut inner = self.inner.lock().unwrap();
        let order = inner
            .orders
            .iter_mut()
            .find(|o| o.price == price && o.status == OrderStatus::Active)
            .unwrap_or_else(|| panic!("no active order at {}", price));
        order.status = status;
        order.id.clone()
    }

    pub fn fail_next_place(&self, error: TradingError) {
        self.inner.lock().unwrap().fail_next_place = Some(error);
    }

    pub fn open_orders(&self) -> Vec<MockOrder> {
        let inner = self.inner.lock().unwrap();
        inner.orders.iter().filter(|o| o.status == OrderStatus::Active).cloned().collect()
    }

    pub fn active_count_at(&self, price: Decimal) -> usize {
        self.open_orders().iter().filter(|o| o.price == price).count()
    }

    pub fn open_prices(&self) -> Vec<Decimal> {
        let mut prices: Vec<Decimal> = self.open_orders().iter().map(|o| o.price).collect();
        prices.sort();
        prices
    }

    /// Every order ever placed, in placement order
    pub fn placed_orders(&self) -> Vec<MockOrder> {
        let inner = self.inner.lock().unwrap();
        inner.orders.iter().filter(|o| !o.id.starts_with("foreign-")).cloned().collect()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.inner.lock().unwrap().cancelled.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.inner.lock().unwrap().calls.get(operation).copied().unwrap_or(0)
    }

    fn record(&self, operation: &'static str) {
        *self.inner.lock().unwrap().calls.entry(operation).or_insert(0) += 1;
    }
}

impl MockOrder {
    fn to_record(&self) -> OrderRecord {
        let deal_size = if self.status == OrderStatus::Done { self.size } else { Decimal::ZERO };
        OrderRecord {
            id: self.id.clone(),
            side: Some(self.side),
            price: self.price,
            requested_size: self.size,
            deal_size,
            status: self.status,
        }
    }
}

#[async_trait]
impl ExchangeGateway for MockExchange {
    async fn fetch_ticker(&self) -> TradingResult<Ticker> {
        self.record("fetch_ticker");
        Ok(self.inner.lock().unwrap().ticker)
    }

    async fn fetch_instrument_spec(&self) -> TradingResult<InstrumentSpec> {
        self.record("fetch_instrument_spec");
        Ok(self.inner.lock().unwrap().spec.clone())
    }

    async fn fetch_recent_closes(&self, limit: usize) -> TradingResult<Vec<Decimal>> {
        self.record("fetch_recent_closes");
        let closes = self.inner.lock().unwrap().closes.clone();
        let skip = closes.len().saturating_sub(limit);
        Ok(closes.into_iter().skip(skip).collect())
    }

    async fn list_open_orders(&self) -> TradingResult<Vec<OpenOrder>> {
        self.record("list_open_orders");
        Ok(self
            .open_orders()
            .into_iter()
            .map(|o| OpenOrder { order_id: o.id, price: o.price, side: o.side })
            .collect())
    }

    async fn place_limit_order(
        &self,
        client_oid: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> TradingResult<String> {
        self.record("place_limit_order");
        let mut inner = self.inner.lock().unwrap();
        if let Some(error) = inner.fail_next_place.take() {
            return Err(error);
        }
        let id = format!("order-{}", inner.next_id);
        inner.next_id += 1;
        inner.orders.push(MockOrder {
            id: id.clone(),
            client_oid: Some(client_oid.to_string()),
            side,
            price,
            size,
            status: OrderStatus::Active,
        });
        Ok(id)
    }

    async fn find_order_by_client_oid(&self, client_oid: &str) -> TradingResult<Option<OrderRecord>> {
        self.record("find_order_by_client_oid");
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .orders
            .iter()
            .find(|o| o.client_oid.as_deref() == Some(client_oid))
            .map(MockOrder::to_record))
    }

    async fn get_order_status(&self, order_id: &str) -> TradingResult<OrderRecord> {
        self.record("get_order_status");
        let inner = self.inner.lock().unwrap();
        let order = inner
            .orders
            .iter()
            .find(|o| o.id == order_id)
            .ok_or_else(|| TradingError::Api { code: "400100".into(), message: "order not exists".into() })?;
        Ok(order.to_record())
    }

    async fn cancel_order(&self, order_id: &str) -> TradingResult<()> {
        self.record("cancel_order");
        let mut inner = self.inner.lock().unwrap();
        if let Some(order) = inner.orders.iter_mut().find(|o| o.id == order_id) {
            order.status = OrderStatus::Cancelled;
        }
        inner.cancelled.push(order_id.to_string());
        Ok(())
    }
}
