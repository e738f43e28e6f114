// KuCoin spot REST gateway

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::clients::kucoin_auth::KucoinAuth;
use crate::clients::ExchangeGateway;
use crate::config::Config;
use crate::core::precision::precision_of;
use crate::core::retry::RetryPolicy;
use crate::core::types::{InstrumentSpec, OpenOrder, OrderRecord, OrderStatus, Side, Ticker};
use crate::error::{TradingError, TradingResult};

/// Envelope code KuCoin uses for success
pub const SUCCESS_CODE: &str = "200000";
/// Envelope code for "too many requests"; treated as a transport failure
pub const RATE_LIMITED_CODE: &str = "429000";
/// Envelope code returned when an order lookup matches nothing
pub const ORDER_NOT_FOUND_CODE: &str = "400100";
/// Largest page the active-orders listing accepts
pub const OPEN_ORDERS_PAGE_SIZE: u32 = 500;

/// Sliding-window request throttle
#[derive(Debug)]
pub struct RateLimiter {
    max_calls: u32,
    window: Duration,
    calls: VecDeque<Instant>,
}

impl RateLimiter {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self {
            max_calls: max_calls.max(1),
            window,
            calls: VecDeque::new(),
        }
    }

    /// Wait until another call fits in the window, then record it
    pub async fn wait_if_needed(&mut self) {
        loop {
            let now = Instant::now();
            while let Some(&oldest) = self.calls.front() {
                if now.duration_since(oldest) >= self.window {
                    self.calls.pop_front();
                } else {
                    break;
                }
            }

            if self.calls.len() < self.max_calls as usize {
                self.calls.push_back(now);
                return;
            }

            if let Some(&oldest) = self.calls.front() {
                let wait = self.window.saturating_sub(now.duration_since(oldest));
                debug!(?wait, "Rate limit reached, waiting");
                sleep(wait).await;
            }
        }
    }

    pub fn in_window(&self) -> usize {
        self.calls.len()
    }
}

pub struct KucoinClient {
    http: reqwest::Client,
    base_url: String,
    symbol: String,
    auth: KucoinAuth,
    retry: RetryPolicy,
    rate_limiter: Mutex<RateLimiter>,
    candle_interval: String,
}

impl KucoinClient {
    pub fn new(base_url: &str, symbol: &str, auth: KucoinAuth) -> TradingResult<Self> {
        Self::with_timeout(base_url, symbol, auth, Duration::from_secs(10))
    }

    pub fn with_timeout(base_url: &str, symbol: &str, auth: KucoinAuth, timeout: Duration) -> TradingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TradingError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            symbol: symbol.to_string(),
            auth,
            retry: RetryPolicy::default(),
            rate_limiter: Mutex::new(RateLimiter::new(30, Duration::from_secs(3))),
            candle_interval: "1min".to_string(),
        })
    }

    /// Build a client from loaded configuration. Credentials must be present.
    pub fn from_config(config: &Config) -> TradingResult<Self> {
        config.require_credentials()?;
        let auth = KucoinAuth::from_credentials(&config.credentials)?;
        let client = Self::with_timeout(
            &config.exchange.rest_url,
            &config.exchange.symbol,
            auth,
            Duration::from_secs(config.exchange.request_timeout_secs),
        )?
        .with_retry_policy(config.retry.policy())
        .with_rate_limit(
            config.rate_limit.max_requests,
            Duration::from_millis(config.rate_limit.window_ms),
        )
        .with_candle_interval(&config.exchange.candle_interval)?;

        info!(symbol = %client.symbol, base_url = %client.base_url, "KuCoin client ready");
        Ok(client)
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_rate_limit(mut self, max_requests: u32, window: Duration) -> Self {
        self.rate_limiter = Mutex::new(RateLimiter::new(max_requests, window));
        self
    }

    pub fn with_candle_interval(mut self, interval: &str) -> TradingResult<Self> {
        interval_seconds(interval)?;
        self.candle_interval = interval.to_string();
        Ok(self)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// One signed attempt. Timestamp and signature are computed here so that
    /// every retry carries fresh ones.
    async fn send_once(
        &self,
        method: Method,
        path_and_query: &str,
        body: Option<&Value>,
    ) -> TradingResult<Option<Value>> {
        self.rate_limiter.lock().await.wait_if_needed().await;

        let body = match body {
            Some(value) if method != Method::GET => serde_json::to_string(value)?,
            _ => String::new(),
        };
        let timestamp = Utc::now().timestamp_millis();
        let headers = self.auth.headers(timestamp, method.as_str(), path_and_query, &body)?;

        let url = format!("{}{}", self.base_url, path_and_query);
        let mut request = self.http.request(method.clone(), &url).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }

        debug!(%method, path = path_and_query, "→ request");
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        parse_envelope_data(status, &text)
    }

    /// Retry transport failures per the configured policy
    async fn request(&self, operation: &str, method: Method, path_and_query: &str) -> TradingResult<Value> {
        self.request_optional(operation, method, path_and_query)
            .await?
            .ok_or_else(missing_data)
    }

    /// Like [`request`](Self::request) but a null `data` payload is `None`
    async fn request_optional(
        &self,
        operation: &str,
        method: Method,
        path_and_query: &str,
    ) -> TradingResult<Option<Value>> {
        self.retry
            .execute(operation, move || self.send_once(method.clone(), path_and_query, None))
            .await
    }

    fn market_path(&self, path: &str) -> String {
        format!("{}?symbol={}", path, self.symbol)
    }
}

#[async_trait]
impl ExchangeGateway for KucoinClient {
    async fn fetch_ticker(&self) -> TradingResult<Ticker> {
        let path = self.market_path("/api/v1/market/orderbook/level1");
        let data = self.request("fetch_ticker", Method::GET, &path).await?;
        Ok(Ticker {
            bid: decimal_field(&data, "bestBid")?,
            ask: decimal_field(&data, "bestAsk")?,
        })
    }

    async fn fetch_instrument_spec(&self) -> TradingResult<InstrumentSpec> {
        let data = self.request("fetch_instrument_spec", Method::GET, "/api/v2/symbols").await?;
        let catalog = data
            .as_array()
            .ok_or_else(|| TradingError::Parse("symbol catalog is not an array".to_string()))?;

        let entry = catalog
            .iter()
            .find(|s| s.get("symbol").and_then(Value::as_str) == Some(self.symbol.as_str()))
            .ok_or_else(|| TradingError::SymbolNotFound(self.symbol.clone()))?;

        let spec = InstrumentSpec {
            symbol: self.symbol.clone(),
            tick_size: decimal_field(entry, "priceIncrement")?,
            lot_precision: precision_of(decimal_field(entry, "baseIncrement")?),
            min_size: decimal_field(entry, "baseMinSize")?,
        };
        debug!(?spec, "Instrument spec loaded");
        Ok(spec)
    }

    async fn fetch_recent_closes(&self, limit: usize) -> TradingResult<Vec<Decimal>> {
        let interval = interval_seconds(&self.candle_interval)?;
        let end = Utc::now().timestamp();
        let start = end - interval * limit as i64;
        let path = format!(
            "/api/v1/market/candles?type={}&symbol={}&startAt={}&endAt={}",
            self.candle_interval, self.symbol, start, end
        );
        let data = self.request("fetch_recent_closes", Method::GET, &path).await?;
        parse_closes(&data, limit)
    }

    async fn list_open_orders(&self) -> TradingResult<Vec<OpenOrder>> {
        let mut orders = Vec::new();
        let mut page: u64 = 1;
        loop {
            let path = format!(
                "/api/v1/orders?symbol={}&status=active&pageSize={}&currentPage={}",
                self.symbol, OPEN_ORDERS_PAGE_SIZE, page
            );
            let data = self.request("list_open_orders", Method::GET, &path).await?;
            orders.extend(parse_open_orders(&data)?);
            match page_position(&data) {
                Some((_, total)) if page < total => page += 1,
                _ => break,
            }
        }
        if page > 1 {
            debug!(pages = page, orders = orders.len(), "Open orders listed");
        }
        Ok(orders)
    }

    async fn place_limit_order(
        &self,
        client_oid: &str,
        side: Side,
        price: Decimal,
        size: Decimal,
    ) -> TradingResult<String> {
        let body = json!({
            "clientOid": client_oid,
            "side": side.as_str(),
            "symbol": self.symbol,
            "type": "limit",
            "price": price.normalize().to_string(),
            "size": size.normalize().to_string(),
            "timeInForce": "GTC",
        });

        let body = &body;
        let data = RetryPolicy::no_retry()
            .execute("place_limit_order", move || {
                self.send_once(Method::POST, "/api/v1/orders", Some(body))
            })
            .await?
            .ok_or_else(missing_data)?;

        let order_id = string_field(&data, "orderId")?;
        info!(%side, %price, %size, order_id = %order_id, client_oid, "📝 Limit order placed");
        Ok(order_id)
    }

    async fn find_order_by_client_oid(&self, client_oid: &str) -> TradingResult<Option<OrderRecord>> {
        let path = format!("/api/v1/order/client-order/{}", client_oid);
        let data = match self.request_optional("find_order_by_client_oid", Method::GET, &path).await {
            Ok(Some(data)) => data,
            Ok(None) => return Ok(None),
            Err(TradingError::Api { code, .. }) if code == ORDER_NOT_FOUND_CODE => return Ok(None),
            Err(e) => return Err(e),
        };
        let order_id = string_field(&data, "id")?;
        parse_order_record(&data, &order_id).map(Some)
    }

    async fn get_order_status(&self, order_id: &str) -> TradingResult<OrderRecord> {
        let path = format!("/api/v1/orders/{}", order_id);
        let data = self.request("get_order_status", Method::GET, &path).await?;
        parse_order_record(&data, order_id)
    }

    async fn cancel_order(&self, order_id: &str) -> TradingResult<()> {
        let path = format!("/api/v1/orders/{}", order_id);
        self.request("cancel_order", Method::DELETE, &path).await?;
        debug!(order_id, "Order cancelled");
        Ok(())
    }
}

/// Validate the `{code, msg, data}` envelope and return `data`
pub fn parse_envelope(status: StatusCode, text: &str) -> TradingResult<Value> {
    parse_envelope_data(status, text)?.ok_or_else(missing_data)
}

/// Validate the envelope; a null or absent `data` is `None`.
///
/// A 429 or 5xx response is a transport failure whatever its body says.
pub fn parse_envelope_data(status: StatusCode, text: &str) -> TradingResult<Option<Value>> {
    let envelope: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() => {
            return Err(TradingError::ApiConnection(format!("HTTP {}", status)));
        }
        Err(e) => {
            return Err(TradingError::Parse(format!("HTTP {} with non-JSON body: {}", status, e)));
        }
    };

    let code = match envelope.get("code") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    let message = envelope
        .get("msg")
        .and_then(Value::as_str)
        .unwrap_or("no message")
        .to_string();

    if code != SUCCESS_CODE {
        if code == RATE_LIMITED_CODE || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(TradingError::ApiConnection(format!("rate limited: {}", message)));
        }
        if status.is_server_error() {
            return Err(TradingError::ApiConnection(format!("HTTP {} code {}: {}", status, code, message)));
        }
        let code = if code.is_empty() { "missing".to_string() } else { code };
        return Err(TradingError::Api { code, message });
    }

    match envelope.get("data") {
        Some(Value::Null) | None => Ok(None),
        Some(data) => Ok(Some(data.clone())),
    }
}

fn missing_data() -> TradingError {
    TradingError::Parse("response has no data payload".to_string())
}

/// `(currentPage, totalPage)` of a paginated payload
pub fn page_position(data: &Value) -> Option<(u64, u64)> {
    let current = data.get("currentPage")?.as_u64()?;
    let total = data.get("totalPage")?.as_u64()?;
    Some((current, total))
}

/// Map either status shape onto [`OrderStatus`]: an explicit `status`
/// string, or the `isActive` / `cancelExist` boolean pair.
pub fn normalize_status(data: &Value) -> OrderStatus {
    if let Some(status) = data.get("status").and_then(Value::as_str) {
        return match status.to_ascii_lowercase().as_str() {
            "active" | "open" | "new" | "partially_filled" => OrderStatus::Active,
            "done" | "filled" | "match" | "closed" => OrderStatus::Done,
            "cancelled" | "canceled" => OrderStatus::Cancelled,
            "failed" | "rejected" => OrderStatus::Failed,
            _ => OrderStatus::Unknown,
        };
    }

    let is_active = data.get("isActive").and_then(Value::as_bool);
    let cancel_exist = data.get("cancelExist").and_then(Value::as_bool);
    match (is_active, cancel_exist) {
        (Some(true), _) => OrderStatus::Active,
        (_, Some(true)) => OrderStatus::Cancelled,
        (Some(false), _) => OrderStatus::Done,
        (None, _) => OrderStatus::Unknown,
    }
}

pub fn parse_order_record(data: &Value, order_id: &str) -> TradingResult<OrderRecord> {
    Ok(OrderRecord {
        id: data
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or(order_id)
            .to_string(),
        side: data.get("side").and_then(Value::as_str).and_then(Side::parse),
        price: optional_decimal(data, "price")?,
        requested_size: optional_decimal(data, "size")?,
        deal_size: optional_decimal(data, "dealSize")?,
        status: normalize_status(data),
    })
}

/// Open orders arrive either as a bare array or paginated under `items`
pub fn parse_open_orders(data: &Value) -> TradingResult<Vec<OpenOrder>> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(obj) => obj
            .get("items")
            .and_then(Value::as_array)
            .ok_or_else(|| TradingError::Parse("open orders object has no items array".to_string()))?,
        _ => return Err(TradingError::Parse("unexpected open orders payload".to_string())),
    };

    items
        .iter()
        .map(|item| {
            let side = item
                .get("side")
                .and_then(Value::as_str)
                .and_then(Side::parse)
                .ok_or_else(|| TradingError::Parse("open order without a valid side".to_string()))?;
            Ok(OpenOrder {
                order_id: string_field(item, "id")?,
                price: decimal_field(item, "price")?,
                side,
            })
        })
        .collect()
}

/// Candle rows are `[time, open, close, high, low, volume, turnover]`,
/// newest first. Returns closes oldest first, at most `limit` of them.
pub fn parse_closes(data: &Value, limit: usize) -> TradingResult<Vec<Decimal>> {
    let rows = data
        .as_array()
        .ok_or_else(|| TradingError::Parse("candles payload is not an array".to_string()))?;

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let cols = row
            .as_array()
            .filter(|c| c.len() >= 3)
            .ok_or_else(|| TradingError::Parse("malformed candle row".to_string()))?;
        let time = decimal_value(&cols[0])?;
        let close = decimal_value(&cols[2])?;
        candles.push((time, close));
    }

    candles.sort_by(|a, b| a.0.cmp(&b.0));
    let skip = candles.len().saturating_sub(limit);
    Ok(candles.into_iter().skip(skip).map(|(_, close)| close).collect())
}

/// Length of a KuCoin candle type in seconds
pub fn interval_seconds(interval: &str) -> TradingResult<i64> {
    let secs = match interval {
        "1min" => 60,
        "3min" => 180,
        "5min" => 300,
        "15min" => 900,
        "30min" => 1_800,
        "1hour" => 3_600,
        "2hour" => 7_200,
        "4hour" => 14_400,
        "6hour" => 21_600,
        "8hour" => 28_800,
        "12hour" => 43_200,
        "1day" => 86_400,
        "1week" => 604_800,
        other => return Err(TradingError::Config(format!("unsupported candle interval '{}'", other))),
    };
    Ok(secs)
}

fn decimal_value(value: &Value) -> TradingResult<Decimal> {
    match value {
        Value::String(s) => s
            .parse::<Decimal>()
            .map_err(|e| TradingError::Parse(format!("invalid decimal '{}': {}", s, e))),
        Value::Number(n) => n
            .to_string()
            .parse::<Decimal>()
            .map_err(|e| TradingError::Parse(format!("invalid decimal {}: {}", n, e))),
        other => Err(TradingError::Parse(format!("expected decimal, got {}", other))),
    }
}

fn decimal_field(data: &Value, key: &str) -> TradingResult<Decimal> {
    let value = data
        .get(key)
        .ok_or_else(|| TradingError::Parse(format!("missing field '{}'", key)))?;
    decimal_value(value)
}

fn optional_decimal(data: &Value, key: &str) -> TradingResult<Decimal> {
    match data.get(key) {
        None | Some(Value::Null) => Ok(Decimal::ZERO),
        Some(value) => decimal_value(value),
    }
}

fn string_field(data: &Value, key: &str) -> TradingResult<String> {
    data.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| TradingError::Parse(format!("missing field '{}'", key)))
}
