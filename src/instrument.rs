//! Instrument identity and per-symbol mutable state.

use parking_lot::Mutex;

use crate::market_data::types::L2Depth;

/// Immutable identity of a subscribed instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentId {
    pub exchange: String,
    pub name: String,
    /// Exchange-native instrument code, e.g. `btc_usdt`.
    pub code: String,
}

#[derive(Debug)]
struct BookState {
    current_depth: L2Depth,
    previous_depth: L2Depth,
    order_book_sequence: u64,
}

#[derive(Debug)]
struct TradeState {
    last_exchange_trade_id: String,
    trade_sequence: u64,
    recovered: bool,
}

/// Per-symbol state, created once at startup and mutated only by the
/// instrument's own worker pair.
///
/// The two field groups are locked independently: the order-book group is
/// written solely by the book worker, the trade group solely by the trade
/// worker. Locks are never held across an await point.
pub struct Instrument {
    pub id: InstrumentId,
    /// Resolved persistence target for order-book snapshots.
    pub snapshot_table: String,
    book: Mutex<BookState>,
    trades: Mutex<TradeState>,
}

/// `{exchange}_{instrument}_snapshot`, lowercased, with anything outside
/// `[a-z0-9]` folded to `_` so the result is a valid SQL identifier.
pub fn snapshot_table_name(exchange: &str, instrument: &str) -> String {
    let fold = |s: &str| {
        s.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect::<String>()
    };
    format!("{}_{}_snapshot", fold(exchange), fold(instrument))
}

impl Instrument {
    pub fn new(id: InstrumentId) -> Self {
        let snapshot_table = snapshot_table_name(&id.exchange, &id.name);
        Self {
            id,
            snapshot_table,
            book: Mutex::new(BookState {
                current_depth: L2Depth::empty(),
                previous_depth: L2Depth::empty(),
                order_book_sequence: 0,
            }),
            trades: Mutex::new(TradeState {
                last_exchange_trade_id: "0".to_string(),
                trade_sequence: 0,
                recovered: false,
            }),
        }
    }

    /// Reset the mutable state ahead of launching the worker pair.
    pub fn reset_for_start(&self) {
        let mut book = self.book.lock();
        book.current_depth = L2Depth::empty();
        book.previous_depth = L2Depth::empty();
        drop(book);
        self.trades.lock().recovered = false;
    }

    /// Rotate the previous snapshot out, install the new one and advance the
    /// book sequence. Returns the sequence assigned to the new snapshot.
    pub fn apply_snapshot(&self, depth: L2Depth) -> u64 {
        let mut book = self.book.lock();
        book.previous_depth = std::mem::replace(&mut book.current_depth, depth);
        book.order_book_sequence += 1;
        book.order_book_sequence
    }

    /// Advance the trade watermark if `incoming` strictly exceeds it.
    /// Returns the trade sequence assigned on acceptance; `None` means the
    /// trade is stale or a duplicate and must be dropped.
    pub fn try_advance_watermark(&self, trade_id: &str, incoming: i128) -> Option<u64> {
        let mut trades = self.trades.lock();
        let watermark = trades.last_exchange_trade_id.parse::<i128>().unwrap_or(0);
        if incoming > watermark {
            trades.last_exchange_trade_id = trade_id.to_string();
            trades.trade_sequence += 1;
            Some(trades.trade_sequence)
        } else {
            None
        }
    }

    /// Latch the recovery flag. Returns true only on the false -> true
    /// transition.
    pub fn mark_recovered(&self) -> bool {
        let mut trades = self.trades.lock();
        if trades.recovered {
            false
        } else {
            trades.recovered = true;
            true
        }
    }

    pub fn current_depth(&self) -> L2Depth {
        self.book.lock().current_depth.clone()
    }

    pub fn previous_depth(&self) -> L2Depth {
        self.book.lock().previous_depth.clone()
    }

    pub fn order_book_sequence(&self) -> u64 {
        self.book.lock().order_book_sequence
    }

    pub fn last_trade_id(&self) -> String {
        self.trades.lock().last_exchange_trade_id.clone()
    }

    /// Seed the watermark, e.g. from storage at startup.
    pub fn set_last_trade_id(&self, trade_id: impl Into<String>) {
        self.trades.lock().last_exchange_trade_id = trade_id.into();
    }

    pub fn trade_sequence(&self) -> u64 {
        self.trades.lock().trade_sequence
    }

    pub fn is_recovered(&self) -> bool {
        self.trades.lock().recovered
    }
}
