//! Persisted grid state and the pure ladder arithmetic behind it
//!
//! Nothing in this module performs I/O. The engine feeds exchange reads into
//! these functions and persists the resulting [`GridState`].

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::GridMode;
use crate::core::precision::{round_lot, round_to_tick};
use crate::core::types::{InstrumentSpec, Side};
use crate::error::{TradingError, TradingResult};

/// Snapshot schema version written by this build
pub const STATE_VERSION: u32 = 1;

/// The buy that opened the position a resting sell will close
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub order_id: String,
    pub price: Decimal,
    pub fee: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridLevel {
    pub price: Decimal,
    pub side: Side,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry: Option<Entry>,
}

impl GridLevel {
    pub fn new(price: Decimal, side: Side) -> Self {
        Self { price, side, order_id: None, entry: None }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridState {
    pub version: u32,
    #[serde(default)]
    pub reference_price: Option<Decimal>,
    #[serde(default)]
    pub step: Decimal,
    #[serde(default)]
    pub quantity: Decimal,
    /// Sorted by ascending price, at most one level per price
    #[serde(default)]
    pub levels: Vec<GridLevel>,
    #[serde(default)]
    pub total_realized_pnl: Decimal,
    #[serde(default)]
    pub total_fees_paid: Decimal,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_activity: Option<DateTime<Utc>>,
}

impl Default for GridState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            reference_price: None,
            step: Decimal::ZERO,
            quantity: Decimal::ZERO,
            levels: Vec::new(),
            total_realized_pnl: Decimal::ZERO,
            total_fees_paid: Decimal::ZERO,
            start_time: None,
            last_activity: None,
        }
    }
}

impl GridState {
    /// Fresh active grid. Running totals start at zero.
    pub fn new(ladder: Ladder, quantity: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            reference_price: Some(ladder.reference_price),
            step: ladder.step,
            quantity,
            levels: ladder.levels,
            start_time: Some(now),
            last_activity: Some(now),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        !self.levels.is_empty()
    }

    pub fn is_occupied(&self, price: Decimal) -> bool {
        self.levels.iter().any(|l| l.price == price)
    }

    pub fn level_index(&self, price: Decimal) -> Option<usize> {
        self.levels.iter().position(|l| l.price == price)
    }

    pub fn count_side(&self, side: Side) -> usize {
        self.levels.iter().filter(|l| l.side == side).count()
    }

    /// Lowest price at which the grid holds or is bidding for inventory:
    /// resting buy levels and the entry prices carried by resting sells.
    pub fn lowest_buy_exposure(&self) -> Option<Decimal> {
        self.levels
            .iter()
            .filter_map(|l| match (l.side, &l.entry) {
                (Side::Buy, _) => Some(l.price),
                (Side::Sell, Some(entry)) => Some(entry.price),
                (Side::Sell, None) => None,
            })
            .min()
    }

    /// Remove the level at `index` and insert `replacement`, keeping price order.
    pub fn replace_level(&mut self, index: usize, replacement: Option<GridLevel>) -> GridLevel {
        let removed = self.levels.remove(index);
        if let Some(level) = replacement {
            let pos = self.levels.partition_point(|l| l.price < level.price);
            self.levels.insert(pos, level);
        }
        removed
    }
}

/// Quantized price points for a new grid
#[derive(Debug, Clone, PartialEq)]
pub struct Ladder {
    pub reference_price: Decimal,
    pub lower: Decimal,
    pub upper: Decimal,
    pub step: Decimal,
    pub levels: Vec<GridLevel>,
}

/// Lay out `intervals + 1` evenly spaced prices across
/// `reference * (1 ± range_percent)`, snapped to the tick. Prices strictly
/// below the reference are buys, the rest are sells.
pub fn build_ladder(
    reference_price: Decimal,
    range_percent: Decimal,
    intervals: usize,
    tick_size: Decimal,
) -> TradingResult<Ladder> {
    if reference_price <= Decimal::ZERO {
        return Err(TradingError::Config(format!(
            "reference price must be positive, got {}",
            reference_price
        )));
    }
    if intervals < 2 {
        return Err(TradingError::Config(format!("grid needs at least 2 levels, got {}", intervals)));
    }

    let lower = reference_price * (Decimal::ONE - range_percent);
    let upper = reference_price * (Decimal::ONE + range_percent);
    let raw_step = (upper - lower) / Decimal::from(intervals);

    let mut levels: Vec<GridLevel> = Vec::with_capacity(intervals + 1);
    for i in 0..=intervals {
        let price = round_to_tick(lower + raw_step * Decimal::from(i), tick_size);
        if price <= Decimal::ZERO || levels.last().map_or(false, |l| l.price == price) {
            continue;
        }
        let side = if price < reference_price { Side::Buy } else { Side::Sell };
        levels.push(GridLevel::new(price, side));
    }

    if levels.len() < 2 {
        return Err(TradingError::Config(format!(
            "range {} around {} collapses to {} price(s) at tick {}",
            range_percent,
            reference_price,
            levels.len(),
            tick_size
        )));
    }

    let step = round_to_tick(raw_step, tick_size).max(tick_size.max(Decimal::ZERO));

    Ok(Ladder {
        reference_price,
        lower: round_to_tick(lower, tick_size),
        upper: round_to_tick(upper, tick_size),
        step,
        levels,
    })
}

/// Per-order size: budget split evenly across the levels, never below the
/// exchange minimum.
pub fn size_quantity(
    total_budget: Decimal,
    intervals: usize,
    reference_price: Decimal,
    spec: &InstrumentSpec,
) -> TradingResult<Decimal> {
    if intervals == 0 || reference_price <= Decimal::ZERO {
        return Err(TradingError::Config(
            "cannot size orders without levels and a positive reference price".to_string(),
        ));
    }
    let raw = total_budget / Decimal::from(intervals) / reference_price;
    Ok(round_lot(raw, spec.lot_precision).max(spec.min_size))
}

/// Parameters that decide where a filled level is replaced
#[derive(Debug, Clone, Copy)]
pub struct MirrorRules {
    pub mode: GridMode,
    pub step: Decimal,
    pub profit_percent: Decimal,
    pub tick_size: Decimal,
}

/// Level that replaces `filled` once it executes, or `None` when the fill
/// consumes the slot. The returned price is not occupied in `state`; when the
/// natural target is taken the mirror keeps moving outward.
pub fn mirror_level(filled: &GridLevel, rules: &MirrorRules, state: &GridState) -> Option<GridLevel> {
    let (mut price, side, nudge) = match (rules.mode, filled.side) {
        (GridMode::TakeProfit, Side::Buy) => (
            round_to_tick(filled.price * (Decimal::ONE + rules.profit_percent), rules.tick_size),
            Side::Sell,
            rules.tick_size,
        ),
        (GridMode::TakeProfit, Side::Sell) => return None,
        (GridMode::Ladder, Side::Buy) => (filled.price + rules.step, Side::Sell, rules.step),
        (GridMode::Ladder, Side::Sell) => (filled.price - rules.step, Side::Buy, -rules.step),
    };

    if nudge.is_zero() {
        return None;
    }

    while price == filled.price || state.is_occupied(price) {
        price += nudge;
    }
    if price <= Decimal::ZERO {
        return None;
    }

    Some(GridLevel::new(price, side))
}

/// Fee and realized PnL produced by one fill
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FillAccounting {
    pub fee: Decimal,
    pub realized_pnl: Option<Decimal>,
}

/// Book a fill of `size` at the level's price into the running totals.
pub fn apply_fill(state: &mut GridState, level: &GridLevel, size: Decimal, fee_rate: Decimal) -> FillAccounting {
    let fee = size * level.price * fee_rate;
    state.total_fees_paid += fee;

    let realized_pnl = match (level.side, &level.entry) {
        (Side::Sell, Some(entry)) => {
            let pnl = (level.price - entry.price) * size - (fee + entry.fee);
            state.total_realized_pnl += pnl;
            Some(pnl)
        }
        _ => None,
    };

    FillAccounting { fee, realized_pnl }
}

/// Bid has fallen `stop_loss_percent` below the lowest buy exposure.
pub fn stop_loss_triggered(state: &GridState, bid: Decimal, stop_loss_percent: Decimal) -> bool {
    state
        .lowest_buy_exposure()
        .map_or(false, |worst| bid <= worst * (Decimal::ONE - stop_loss_percent))
}

/// No state change for longer than `timeout`.
pub fn idle_expired(state: &GridState, now: DateTime<Utc>, timeout: Duration) -> bool {
    state
        .last_activity
        .or(state.start_time)
        .map_or(false, |since| now - since > timeout)
}

/// Client order id for the order that replaces the fill of `filled_order_id`.
/// The same fill always yields the same id, so an order placed before a
/// restart can be found again instead of being placed twice.
pub fn mirror_client_oid(symbol: &str, filled_order_id: &str) -> String {
    let name = format!("{}/mirror/{}", symbol, filled_order_id);
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Client order id for re-arming an empty level of the grid started at
/// `state.start_time`.
pub fn rearm_client_oid(symbol: &str, state: &GridState, level: &GridLevel) -> String {
    let started = state.start_time.map_or(0, |t| t.timestamp_millis());
    let name = format!("{}/rearm/{}/{}/{}", symbol, started, level.side, level.price.normalize());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}
