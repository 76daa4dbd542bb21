//! AEX adapter.
//!
//! Book and trades come from `depth.php` / `trades.php`. Prices and volumes
//! arrive as numbers or strings depending on magnitude, trade timestamps are
//! epoch seconds in the `date` field, and the trades endpoint delivers
//! newest-first.

use serde_json::Value;

use crate::error::{FeedError, FeedResult};
use crate::instrument::InstrumentId;
use crate::market_data::types::{coerce_f64, coerce_string, L2Depth, Trade, TradeSide};
use crate::transport::RequestTarget;

use super::{epoch_to_utc, parse_ladder, ExchangeAdapter};

#[derive(Debug, Default, Clone)]
pub struct AexAdapter;

impl AexAdapter {
    /// Instrument codes are `{currency}_{market}`, e.g. `btc_usdt`.
    fn pair(code: &str) -> (&str, &str) {
        code.split_once('_').unwrap_or((code, ""))
    }

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
        let trade_side = coerce_string(field("type")?)
            .map(|token| TradeSide::parse(&token))
            .unwrap_or(TradeSide::Unknown);
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

impl ExchangeAdapter for AexAdapter {
    fn name(&self) -> &'static str {
        "aex"
    }

    fn order_book_target(&self, instrument: &InstrumentId) -> RequestTarget {
        let (c, mk_type) = Self::pair(&instrument.code);
        RequestTarget::new(format!(
            "https://api.aex.com/depth.php?c={c}&mk_type={mk_type}"
        ))
    }

    fn trades_target(&self, instrument: &InstrumentId) -> RequestTarget {
        let (c, mk_type) = Self::pair(&instrument.code);
        RequestTarget::new(format!(
            "https://api.aex.com/trades.php?c={c}&mk_type={mk_type}"
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
