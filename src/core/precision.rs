// Price and quantity quantization against exchange increments

use rust_decimal::{Decimal, RoundingStrategy};

/// Snap a price to the nearest multiple of `tick_size`, ties away from zero.
pub fn round_to_tick(price: Decimal, tick_size: Decimal) -> Decimal {
    if tick_size <= Decimal::ZERO {
        return price;
    }
    let ticks = (price / tick_size).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    (ticks * tick_size).normalize()
}

/// Round a quantity to `lot_precision` decimal places, ties away from zero.
pub fn round_lot(quantity: Decimal, lot_precision: u32) -> Decimal {
    quantity
        .round_dp_with_strategy(lot_precision, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Number of fractional digits in an increment such as "0.0001".
pub fn precision_of(increment: Decimal) -> u32 {
    increment.normalize().scale()
}

pub fn is_tick_multiple(price: Decimal, tick_size: Decimal) -> bool {
    tick_size > Decimal::ZERO && (price % tick_size).is_zero()
}
