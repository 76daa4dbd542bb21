//! Normalized value types shared by all exchange adapters.

use chrono::{DateTime, Utc};
use serde_json::Value;
use smallvec::SmallVec;

/// Default number of levels kept per side of the ladder.
pub const DEFAULT_DEPTH: usize = 5;

/// Timestamp format used at the persistence boundary.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d %H:%M:%S%.6f";

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PriceLevel {
    pub price: f64,
    pub volume: f64,
}

/// Bounded L2 snapshot of an order book.
///
/// Each side holds only the levels the venue actually published, best-first
/// in the venue's own order (`len() <= configured depth`). An absent level is
/// represented by absence, never by a zero sentinel, so a genuine zero-volume
/// quote stays distinguishable downstream.
#[derive(Debug, Clone, PartialEq)]
pub struct L2Depth {
    pub bids: SmallVec<[PriceLevel; DEFAULT_DEPTH]>,
    pub asks: SmallVec<[PriceLevel; DEFAULT_DEPTH]>,
    /// Capture time; most venues do not supply a snapshot timestamp.
    pub timestamp: DateTime<Utc>,
}

impl L2Depth {
    pub fn empty() -> Self {
        Self {
            bids: SmallVec::new(),
            asks: SmallVec::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
    Unknown,
}

impl TradeSide {
    /// Fixed mapping from exchange-native side tokens.
    pub fn parse(token: &str) -> Self {
        match token.trim().to_ascii_lowercase().as_str() {
            "buy" | "bid" | "b" | "1" => TradeSide::Buy,
            "sell" | "ask" | "s" | "2" => TradeSide::Sell,
            _ => TradeSide::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "buy",
            TradeSide::Sell => "sell",
            TradeSide::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    /// Exchange-native identifier; ordering key once parsed as an integer.
    pub trade_id: String,
    pub trade_side: TradeSide,
    pub trade_price: f64,
    pub trade_volume: f64,
    pub date_time: DateTime<Utc>,
}

/// Exchanges disagree on whether prices and volumes arrive as JSON numbers
/// or as strings; accept both.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// String form of a field that may arrive as a string or a number
/// (trade ids and side tokens, typically).
pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// An empty body is a no-op cycle, not an error.
pub fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}
