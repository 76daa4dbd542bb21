//! Exchange adapter contract (plugin interface).
//!
//! To add a venue, implement [`ExchangeAdapter`] and register it in
//! [`adapter_for`]. Adapters are stateless and shared across instruments;
//! everything venue-specific — request targets, field names, timestamp
//! encoding, wire ordering — lives behind this trait.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::error::{FeedError, FeedResult};
use crate::instrument::InstrumentId;
use crate::market_data::types::{coerce_f64, L2Depth, PriceLevel, Trade};
use crate::transport::RequestTarget;

pub mod aex;
pub mod bitstamp;

pub trait ExchangeAdapter: Send + Sync + 'static {
    /// Canonical exchange name as used in configuration.
    fn name(&self) -> &'static str;

    /// Divisor applied to raw epoch values before conversion: 1 for seconds,
    /// 1_000 for milliseconds, 1_000_000 for microseconds.
    fn timestamp_unit(&self) -> f64 {
        1.0
    }

    fn order_book_target(&self, instrument: &InstrumentId) -> RequestTarget;

    fn trades_target(&self, instrument: &InstrumentId) -> RequestTarget;

    /// Parse an order-book payload into a ladder bounded to `depth` levels
    /// per side, preserving the venue's best-first ordering.
    fn parse_order_book(
        &self,
        instrument: &InstrumentId,
        raw: &Value,
        depth: usize,
    ) -> FeedResult<L2Depth>;

    /// Parse a trades payload into chronological (oldest-first) order.
    /// Venues that deliver newest-first are reversed here, not downstream.
    fn parse_trades(&self, instrument: &InstrumentId, raw: &Value) -> FeedResult<Vec<Trade>>;
}

/// Resolve the adapter for a configured exchange name.
pub fn adapter_for(exchange: &str) -> Option<Arc<dyn ExchangeAdapter>> {
    match exchange.to_ascii_lowercase().as_str() {
        "aex" => Some(Arc::new(aex::AexAdapter)),
        "bitstamp" => Some(Arc::new(bitstamp::BitstampAdapter)),
        _ => None,
    }
}

pub fn supported_exchanges() -> Vec<&'static str> {
    vec!["aex", "bitstamp"]
}

/// Convert a raw epoch value to UTC after applying the adapter's divisor.
pub fn epoch_to_utc(value: f64, divisor: f64) -> Option<DateTime<Utc>> {
    if !value.is_finite() {
        return None;
    }
    let secs = value / divisor;
    let whole = secs.trunc() as i64;
    let nanos = (secs.fract() * 1e9) as u32;
    Utc.timestamp_opt(whole, nanos).single()
}

/// Shared ladder parser for venues that publish `bids`/`asks` arrays of
/// `[price, volume]` pairs, best-first. A payload missing either side is
/// malformed.
pub(crate) fn parse_ladder(
    instrument: &InstrumentId,
    raw: &Value,
    depth: usize,
) -> FeedResult<L2Depth> {
    let bids = raw
        .get("bids")
        .and_then(Value::as_array)
        .ok_or_else(|| FeedError::malformed(instrument, "missing bids", raw))?;
    let asks = raw
        .get("asks")
        .and_then(Value::as_array)
        .ok_or_else(|| FeedError::malformed(instrument, "missing asks", raw))?;

    let mut ladder = L2Depth::empty();
    for level in bids.iter().take(depth) {
        ladder.bids.push(parse_level(instrument, level, raw)?);
    }
    for level in asks.iter().take(depth) {
        ladder.asks.push(parse_level(instrument, level, raw)?);
    }
    ladder.timestamp = Utc::now();
    Ok(ladder)
}

fn parse_level(instrument: &InstrumentId, level: &Value, payload: &Value) -> FeedResult<PriceLevel> {
    let pair = level
        .as_array()
        .filter(|entries| entries.len() >= 2)
        .ok_or_else(|| {
            FeedError::malformed(instrument, "depth level is not a [price, volume] pair", payload)
        })?;
    let price = coerce_f64(&pair[0])
        .ok_or_else(|| FeedError::malformed(instrument, "unparseable level price", payload))?;
    let volume = coerce_f64(&pair[1])
        .ok_or_else(|| FeedError::malformed(instrument, "unparseable level volume", payload))?;
    Ok(PriceLevel { price, volume })
}
