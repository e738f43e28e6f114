//! Technical indicators over a closing-price series
//!
//! All functions are pure and operate on exact decimals. Only the Bollinger
//! standard deviation passes through `f64` (there is no decimal square root
//! without extra features) and is rounded back before it is returned.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Fractional digits kept for values that pass through `f64`.
const FLOAT_ROUNDTRIP_DP: u32 = 8;

/// Exponential moving average seeded with the simple mean of the first
/// `period` values. Returns `values.len() - period + 1` points, or nothing
/// when the series is shorter than `period`.
pub fn ema(values: &[Decimal], period: usize) -> Vec<Decimal> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }

    let multiplier = Decimal::from(2) / Decimal::from(period + 1);
    let seed = values[..period].iter().copied().sum::<Decimal>() / Decimal::from(period);

    let mut out = Vec::with_capacity(values.len() - period + 1);
    out.push(seed);

    let mut prev = seed;
    for &value in &values[period..] {
        prev = (value - prev) * multiplier + prev;
        out.push(prev);
    }
    out
}

/// Relative strength index with Wilder smoothing.
///
/// The first point uses the plain average gain/loss of the first `period`
/// deltas; later points use `avg = (avg * (period - 1) + current) / period`.
/// Output length is `values.len() - period`.
pub fn rsi(values: &[Decimal], period: usize) -> Vec<Decimal> {
    if period == 0 || values.len() <= period {
        return Vec::new();
    }

    let deltas: Vec<Decimal> = values.windows(2).map(|w| w[1] - w[0]).collect();
    let p = Decimal::from(period);

    let mut avg_gain = deltas[..period].iter().map(|d| gain(*d)).sum::<Decimal>() / p;
    let mut avg_loss = deltas[..period].iter().map(|d| loss(*d)).sum::<Decimal>() / p;

    let mut out = Vec::with_capacity(values.len() - period);
    out.push(rsi_from_averages(avg_gain, avg_loss));

    let smoothing = Decimal::from(period - 1);
    for &delta in &deltas[period..] {
        avg_gain = (avg_gain * smoothing + gain(delta)) / p;
        avg_loss = (avg_loss * smoothing + loss(delta)) / p;
        out.push(rsi_from_averages(avg_gain, avg_loss));
    }
    out
}

fn gain(delta: Decimal) -> Decimal {
    delta.max(Decimal::ZERO)
}

fn loss(delta: Decimal) -> Decimal {
    (-delta).max(Decimal::ZERO)
}

fn rsi_from_averages(avg_gain: Decimal, avg_loss: Decimal) -> Decimal {
    let hundred = Decimal::from(100);
    if avg_loss.is_zero() {
        return hundred;
    }
    hundred - hundred / (Decimal::ONE + avg_gain / avg_loss)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BollingerBands {
    pub middle: Decimal,
    pub upper: Decimal,
    pub lower: Decimal,
}

impl BollingerBands {
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.lower && price <= self.upper
    }
}

/// Mean ± `multiplier` population standard deviations over the whole window.
pub fn bollinger(values: &[Decimal], multiplier: Decimal) -> Option<BollingerBands> {
    if values.is_empty() {
        return None;
    }

    let n = Decimal::from(values.len());
    let mean = values.iter().copied().sum::<Decimal>() / n;
    let variance = values
        .iter()
        .map(|v| (*v - mean) * (*v - mean))
        .sum::<Decimal>()
        / n;

    let std_dev = variance
        .to_f64()
        .map(f64::sqrt)
        .and_then(Decimal::from_f64)?
        .round_dp(FLOAT_ROUNDTRIP_DP);

    Some(BollingerBands {
        middle: mean,
        upper: mean + multiplier * std_dev,
        lower: mean - multiplier * std_dev,
    })
}

/// Periods used by the setup gate
pub const FAST_EMA_PERIOD: usize = 10;
pub const SLOW_EMA_PERIOD: usize = 30;
pub const RSI_PERIOD: usize = 14;
pub const RSI_OVERBOUGHT: u32 = 70;

/// Latest indicator readings used to decide whether a grid may be set up
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSnapshot {
    pub fast_ema: Decimal,
    pub slow_ema: Decimal,
    pub rsi: Decimal,
    pub bands: Option<BollingerBands>,
}

impl TrendSnapshot {
    /// Compute the latest readings; `None` when the series is too short.
    pub fn from_closes(closes: &[Decimal], bollinger_multiplier: Option<Decimal>) -> Option<Self> {
        let fast_ema = *ema(closes, FAST_EMA_PERIOD).last()?;
        let slow_ema = *ema(closes, SLOW_EMA_PERIOD).last()?;
        let rsi = *rsi(closes, RSI_PERIOD).last()?;
        let bands = match bollinger_multiplier {
            Some(m) => Some(bollinger(closes, m)?),
            None => None,
        };
        Some(Self { fast_ema, slow_ema, rsi, bands })
    }

    /// Uptrend (fast EMA above slow) that is not overbought, and, when bands
    /// are configured, a reference price inside them.
    pub fn allows_setup(&self, reference_price: Decimal) -> bool {
        let trending = self.fast_ema > self.slow_ema;
        let not_overbought = self.rsi < Decimal::from(RSI_OVERBOUGHT);
        let inside_band = self.bands.map_or(true, |b| b.contains(reference_price));
        trending && not_overbought && inside_band
    }
}
