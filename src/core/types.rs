// Common types used across the bot

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Buy => "buy",
            Side::Sell => "sell",
        }
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    pub fn parse(s: &str) -> Option<Side> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Some(Side::Buy),
            "sell" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Done,
    Cancelled,
    Failed,
    Unknown,
}

/// Exchange precision rules for the traded symbol. Fetched once per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    pub tick_size: Decimal,
    pub lot_precision: u32,
    pub min_size: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ticker {
    pub bid: Decimal,
    pub ask: Decimal,
}

impl Ticker {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2)
    }
}

/// Resting order as reported by the open-orders listing
#[derive(Debug, Clone, PartialEq)]
pub struct OpenOrder {
    pub order_id: String,
    pub price: Decimal,
    pub side: Side,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderRecord {
    pub id: String,
    pub side: Option<Side>,
    pub price: Decimal,
    pub requested_size: Decimal,
    pub deal_size: Decimal,
    pub status: OrderStatus,
}

impl OrderRecord {
    /// Filled quantity, falling back to the requested size when the
    /// exchange reports a completed order without a deal size.
    pub fn filled_size(&self) -> Decimal {
        if self.deal_size > Decimal::ZERO {
            self.deal_size
        } else {
            self.requested_size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_parsing() {
        assert_eq!(Side::parse("BUY"), Some(Side::Buy));
        assert_eq!(Side::parse(" sell "), Some(Side::Sell));
        assert_eq!(Side::parse("hold"), None);
        assert_eq!(Side::Buy.opposite(), Side::Sell);
    }

    #[test]
    fn test_ticker_mid() {
        let t = Ticker { bid: dec!(99.5), ask: dec!(100.5) };
        assert_eq!(t.mid(), dec!(100));
    }

    #[test]
    fn test_filled_size_fallback() {
        let mut rec = OrderRecord {
            id: "1".into(),
            side: Some(Side::Buy),
            price: dec!(95),
            requested_size: dec!(0.5),
            deal_size: Decimal::ZERO,
            status: OrderStatus::Done,
        };
        assert_eq!(rec.filled_size(), dec!(0.5));
        rec.deal_size = dec!(0.4);
        assert_eq!(rec.filled_size(), dec!(0.4));
    }
}
