//! Grid state machine
//!
//! One call to [`GridEngine::run_cycle`] performs a single pass:
//!
//! * no active grid: optionally gate on trend indicators, then cancel
//!   whatever rests on the symbol and place a fresh ladder;
//! * active grid: check stop-loss and idle timeout, then poll every tracked
//!   order and rotate fills into their mirrors.
//!
//! Every mutation is flushed to the [`StateStore`] before the next exchange
//! call, so a restart resumes from the last committed step. Orders placed
//! while monitoring carry a client order id derived from the snapshot, and
//! the engine looks that id up before placing. An order accepted just before
//! a crash is adopted on restart rather than placed again.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clients::ExchangeGateway;
use crate::config::GridConfig;
use crate::core::indicators::TrendSnapshot;
use crate::core::state::{
    apply_fill, build_ladder, idle_expired, mirror_client_oid, mirror_level, rearm_client_oid, size_quantity,
    stop_loss_triggered, Entry, GridState, MirrorRules,
};
use crate::core::types::{InstrumentSpec, OrderRecord, OrderStatus, Side, Ticker};
use crate::error::{TradingError, TradingResult};
use crate::persistence::StateStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetReason {
    StopLoss,
    IdleTimeout,
    /// Every level was consumed
    Exhausted,
    /// Forced by the run loop after a cycle error
    Error,
    /// Requested by the operator
    Manual,
}

impl fmt::Display for ResetReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResetReason::StopLoss => "stop-loss",
            ResetReason::IdleTimeout => "idle timeout",
            ResetReason::Exhausted => "grid exhausted",
            ResetReason::Error => "cycle error",
            ResetReason::Manual => "manual",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Trend gate refused setup; nothing was touched
    Gated,
    Setup { levels: usize },
    Monitored { fills: usize },
    Reset(ResetReason),
    /// Cancellation observed between exchange calls
    Interrupted,
}

pub struct GridEngine<E: ExchangeGateway> {
    gateway: E,
    config: GridConfig,
    candle_limit: usize,
    store: StateStore,
    state: GridState,
    spec: Option<InstrumentSpec>,
    cancel: CancellationToken,
}

impl<E: ExchangeGateway> GridEngine<E> {
    /// Create an engine, resuming from the store's last snapshot if any
    pub fn new(gateway: E, config: GridConfig, store: StateStore) -> Self {
        let state = store.load();
        Self {
            gateway,
            config,
            candle_limit: 100,
            store,
            state,
            spec: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_candle_limit(mut self, limit: usize) -> Self {
        self.candle_limit = limit;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn state(&self) -> &GridState {
        &self.state
    }

    pub fn gateway(&self) -> &E {
        &self.gateway
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn run_cycle(&mut self) -> TradingResult<CycleOutcome> {
        self.run_cycle_at(Utc::now()).await
    }

    /// Run one cycle treating `now` as the current time
    pub async fn run_cycle_at(&mut self, now: DateTime<Utc>) -> TradingResult<CycleOutcome> {
        if self.cancel.is_cancelled() {
            return Ok(CycleOutcome::Interrupted);
        }

        let spec = self.instrument_spec().await?;
        let ticker = self.gateway.fetch_ticker().await?;

        if !self.state.is_active() {
            return self.setup(now, &spec, ticker).await;
        }

        if stop_loss_triggered(&self.state, ticker.bid, self.config.stop_loss_percent) {
            warn!(
                bid = %ticker.bid,
                worst_buy = ?self.state.lowest_buy_exposure(),
                stop_loss = %self.config.stop_loss_percent,
                "🛑 Stop-loss triggered"
            );
            return self.reset(ResetReason::StopLoss).await;
        }

        if idle_expired(&self.state, now, self.config.idle_timeout()) {
            warn!(
                last_activity = ?self.state.last_activity,
                timeout_secs = self.config.idle_timeout_secs,
                "⏰ Grid idle too long"
            );
            return self.reset(ResetReason::IdleTimeout).await;
        }

        self.monitor(now, &spec).await
    }

    /// Cancel every open order and discard the grid
    pub async fn force_reset(&mut self, reason: ResetReason) -> TradingResult<()> {
        let cancelled = self.gateway.cancel_all_open_orders().await?;
        self.state = GridState::default();
        self.store.clear()?;
        info!(%reason, cancelled, "🔄 Grid reset");
        Ok(())
    }

    async fn reset(&mut self, reason: ResetReason) -> TradingResult<CycleOutcome> {
        self.force_reset(reason).await?;
        Ok(CycleOutcome::Reset(reason))
    }

    async fn instrument_spec(&mut self) -> TradingResult<InstrumentSpec> {
        if let Some(spec) = &self.spec {
            return Ok(spec.clone());
        }
        let spec = self.gateway.fetch_instrument_spec().await?;
        info!(
            symbol = %spec.symbol,
            tick_size = %spec.tick_size,
            lot_precision = spec.lot_precision,
            min_size = %spec.min_size,
            "Instrument spec cached"
        );
        self.spec = Some(spec.clone());
        Ok(spec)
    }

    async fn setup(&mut self, now: DateTime<Utc>, spec: &InstrumentSpec, ticker: Ticker) -> TradingResult<CycleOutcome> {
        let reference = ticker.mid();

        if self.config.trend_filter {
            let closes = self.gateway.fetch_recent_closes(self.candle_limit).await?;
            match TrendSnapshot::from_closes(&closes, self.config.bollinger_multiplier) {
                None => {
                    warn!(closes = closes.len(), "Not enough candle history for the trend gate");
                    return Ok(CycleOutcome::Gated);
                }
                Some(trend) if !trend.allows_setup(reference) => {
                    info!(
                        fast_ema = %trend.fast_ema.round_dp(4),
                        slow_ema = %trend.slow_ema.round_dp(4),
                        rsi = %trend.rsi.round_dp(2),
                        reference = %reference,
                        "Trend gate closed, skipping setup"
                    );
                    return Ok(CycleOutcome::Gated);
                }
                Some(trend) => {
                    debug!(rsi = %trend.rsi.round_dp(2), "Trend gate open");
                }
            }
        }

        let ladder = build_ladder(reference, self.config.range_percent, self.config.levels, spec.tick_size)?;
        let quantity = size_quantity(self.config.total_risk_budget, self.config.levels, reference, spec)?;

        if self.cancel.is_cancelled() {
            return Ok(CycleOutcome::Interrupted);
        }
        self.gateway.cancel_all_open_orders().await?;

        let mut state = GridState::new(ladder, quantity, now);
        for level in state.levels.iter_mut() {
            // Orders placed before an interruption are swept by the next setup
            if self.cancel.is_cancelled() {
                return Ok(CycleOutcome::Interrupted);
            }
            let client_oid = Uuid::new_v4().to_string();
            let order_id = self
                .gateway
                .place_limit_order(&client_oid, level.side, level.price, quantity)
                .await?;
            level.order_id = Some(order_id);
        }

        let placed = state.levels.len();
        self.state = state;
        self.store.save(&self.state)?;

        info!(
            reference = %reference,
            step = %self.state.step,
            quantity = %quantity,
            buys = self.state.count_side(Side::Buy),
            sells = self.state.count_side(Side::Sell),
            "🎯 Grid setup complete"
        );
        Ok(CycleOutcome::Setup { levels: placed })
    }

    async fn monitor(&mut self, now: DateTime<Utc>, spec: &InstrumentSpec) -> TradingResult<CycleOutcome> {
        let tracked: Vec<(Decimal, Option<String>)> = self
            .state
            .levels
            .iter()
            .map(|l| (l.price, l.order_id.clone()))
            .collect();

        let mut fills = 0;
        for (price, order_id) in tracked {
            if self.cancel.is_cancelled() {
                return Ok(CycleOutcome::Interrupted);
            }

            let Some(order_id) = order_id else {
                self.place_missing(price, spec).await?;
                continue;
            };

            let record = self.gateway.get_order_status(&order_id).await?;
            match record.status {
                OrderStatus::Done => {
                    self.rotate_fill(price, &record, now, spec).await?;
                    fills += 1;
                }
                OrderStatus::Cancelled | OrderStatus::Failed => {
                    return Err(TradingError::OrderLifecycle {
                        order_id,
                        status: record.status,
                    });
                }
                OrderStatus::Active | OrderStatus::Unknown => {
                    debug!(%price, order_id = %order_id, status = ?record.status, "Order resting");
                }
            }
        }

        if !self.state.is_active() {
            return self.reset(ResetReason::Exhausted).await;
        }
        Ok(CycleOutcome::Monitored { fills })
    }

    /// Re-arm a level that has no resting order
    async fn place_missing(&mut self, price: Decimal, spec: &InstrumentSpec) -> TradingResult<()> {
        let Some(index) = self.state.level_index(price) else {
            return Ok(());
        };
        let level = &self.state.levels[index];
        let client_oid = rearm_client_oid(&spec.symbol, &self.state, level);
        let order_id = self.place_once(&client_oid, level.side, price).await?;
        self.state.levels[index].order_id = Some(order_id);
        self.store.save(&self.state)
    }

    /// Place an order under `client_oid` unless the exchange already holds
    /// one with that id, in which case its id is returned.
    async fn place_once(&self, client_oid: &str, side: Side, price: Decimal) -> TradingResult<String> {
        if let Some(existing) = self.gateway.find_order_by_client_oid(client_oid).await? {
            info!(
                client_oid,
                order_id = %existing.id,
                %side,
                %price,
                status = ?existing.status,
                "♻️ Adopting order placed before restart"
            );
            return Ok(existing.id);
        }
        self.gateway
            .place_limit_order(client_oid, side, price, self.state.quantity)
            .await
    }

    /// Place the mirror of a filled level, then book the fill. State is only
    /// touched once the mirror order has been accepted.
    async fn rotate_fill(
        &mut self,
        price: Decimal,
        record: &OrderRecord,
        now: DateTime<Utc>,
        spec: &InstrumentSpec,
    ) -> TradingResult<()> {
        let Some(index) = self.state.level_index(price) else {
            return Ok(());
        };
        let filled = self.state.levels[index].clone();

        let rules = MirrorRules {
            mode: self.config.mode,
            step: self.state.step,
            profit_percent: self.config.profit_percent,
            tick_size: spec.tick_size,
        };
        let mut mirror = mirror_level(&filled, &rules, &self.state);
        if let Some(level) = mirror.as_mut() {
            let client_oid = mirror_client_oid(&spec.symbol, &record.id);
            level.order_id = Some(self.place_once(&client_oid, level.side, level.price).await?);
        }

        let size = match record.filled_size() {
            s if s > Decimal::ZERO => s,
            _ => self.state.quantity,
        };
        let accounting = apply_fill(&mut self.state, &filled, size, self.config.fee_rate);

        if let (Side::Buy, Some(level)) = (filled.side, mirror.as_mut()) {
            level.entry = Some(Entry {
                order_id: record.id.clone(),
                price: filled.price,
                fee: accounting.fee,
            });
        }

        let replacement = mirror.as_ref().map(|l| (l.side, l.price));
        self.state.replace_level(index, mirror);
        self.state.last_activity = Some(now);
        self.store.save(&self.state)?;

        info!(
            side = %filled.side,
            price = %filled.price,
            size = %size,
            fee = %accounting.fee,
            pnl = ?accounting.realized_pnl,
            mirror = ?replacement,
            total_pnl = %self.state.total_realized_pnl,
            "✅ Order filled"
        );
        Ok(())
    }
}
