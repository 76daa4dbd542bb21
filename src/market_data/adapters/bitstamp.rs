//! Bitstamp adapter.
//!
//! Every numeric field arrives as a string. Trades are delivered
//! newest-first and the side token is `"0"` for buys, `"1"` for sells —
//! the opposite of the shared token mapping, so it is translated here.

use serde_json::Value;

use crate::error::{FeedError, FeedResult};
use crate::instrument::InstrumentId;
use crate::market_data::types::{coerce_f64, coerce_string, L2Depth, Trade, TradeSide};
use crate::transport::RequestTarget;

use super::{epoch_to_utc, parse_ladder, ExchangeAdapter};

#[derive(Debug, Default, Clone)]
pub struct BitstampAdapter;

fn parse_side(raw: &Value) -> TradeSide {
    match coerce_string(raw).as_deref() {
        Some("0") => TradeSide::Buy,
        Some("1") => TradeSide::Sell,
        Some(other) => TradeSide::parse(other),
        None => TradeSide::Unknown,
    }
}

impl BitstampAdapter {
    fn parse_trade(&self, instrument: &InstrumentId, entry: &Value) -> FeedResult<Trade> {
        let field = |name: &str| {
            entry
                .get(name)
                .ok_or_else(|| FeedError::malformed(instrument, format!("missing {name}"), entry))
        };

        let epoch = coerce_f64(field("date")?)
            .ok_or_else(|| FeedError::malformed(instrument, "unparseable date", entry))?;
        let date_time = epoch_to_utc(epoch, self.timestamp_unit())
            .ok_or_else(|| FeedError::malformed(instrument, "timestamp out of range", entry))?;
        let trade_side = parse_side(field("type")?);
        let trade_id = coerce_string(field("tid")?)
            .ok_or_else(|| FeedError::malformed(instrument, "unparseable tid", entry))?;
        let trade_price = coerce_f64(field("price")?)
            .ok_or_else(|| FeedError::malformed(instrument, "unparseable price", entry))?;
        let trade_volume = coerce_f64(field("amount")?)
            .ok_or_else(|| FeedError::malformed(instrument, "unparseable amount", entry))?;

        Ok(Trade {
            trade_id,
            trade_side,
            trade_price,
            trade_volume,
            date_time,
        })
    }
}

impl ExchangeAdapter for BitstampAdapter {
    fn name(&self) -> &'static str {
        "bitstamp"
    }

    fn order_book_target(&self, instrument: &InstrumentId) -> RequestTarget {
        RequestTarget::new(format!(
            "https://www.bitstamp.net/api/v2/order_book/{}/",
            instrument.code.to_ascii_lowercase()
        ))
    }

    fn trades_target(&self, instrument: &InstrumentId) -> RequestTarget {
        RequestTarget::new(format!(
            "https://www.bitstamp.net/api/v2/transactions/{}/?time=minute",
            instrument.code.to_ascii_lowercase()
        ))
    }

    fn parse_order_book(
        &self,
        instrument: &InstrumentId,
        raw: &Value,
        depth: usize,
    ) -> FeedResult<L2Depth> {
        parse_ladder(instrument, raw, depth)
    }

    fn parse_trades(&self, instrument: &InstrumentId, raw: &Value) -> FeedResult<Vec<Trade>> {
        let entries = raw.as_array().ok_or_else(|| {
            FeedError::malformed(instrument, "trades payload is not an array", raw)
        })?;

        // Wire order is newest-first; emit oldest-first.
        entries
            .iter()
            .rev()
            .map(|entry| self.parse_trade(instrument, entry))
            .collect()
    }
}
