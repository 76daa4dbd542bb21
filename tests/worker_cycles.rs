//! Worker behavior against a scripted transport and a recording sink.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};

use tickfeed_rs::error::{FeedError, FeedResult};
use tickfeed_rs::instrument::{Instrument, InstrumentId};
use tickfeed_rs::market_data::adapters::{adapter_for, ExchangeAdapter};
use tickfeed_rs::market_data::gateway::ExchangeGateway;
use tickfeed_rs::market_data::types::{
    coerce_f64, coerce_string, L2Depth, PriceLevel, Trade, TradeSide,
};
use tickfeed_rs::market_data::worker::{
    BookCycle, PollConfig, PollingWorker, TradeCycle, TradeIngestWorker,
};
use tickfeed_rs::persist::PersistenceSink;
use tickfeed_rs::transport::{RequestTarget, RestTransport};

/// Replays a scripted sequence of responses; an exhausted script serves
/// empty payloads.
struct ScriptedTransport {
    responses: Mutex<VecDeque<FeedResult<Value>>>,
}

impl ScriptedTransport {
    fn new(responses: Vec<FeedResult<Value>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
        })
    }

    fn failure() -> FeedError {
        FeedError::Status {
            url: "http://scripted.test/feed".to_string(),
            status: 503,
        }
    }
}

#[async_trait]
impl RestTransport for ScriptedTransport {
    async fn request(&self, _target: &RequestTarget) -> FeedResult<Value> {
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Value::Null))
    }
}

#[derive(Default)]
struct RecordingSink {
    books: Mutex<Vec<(u64, L2Depth)>>,
    trades: Mutex<Vec<(u64, Trade)>>,
    failing: AtomicBool,
}

impl RecordingSink {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn trade_ids(&self) -> Vec<String> {
        self.trades
            .lock()
            .iter()
            .map(|(_, trade)| trade.trade_id.clone())
            .collect()
    }
}

#[async_trait]
impl PersistenceSink for RecordingSink {
    async fn insert_order_book(
        &self,
        _instrument: &Instrument,
        depth: &L2Depth,
        sequence: u64,
    ) -> FeedResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedError::Database(sqlx::Error::PoolClosed));
        }
        self.books.lock().push((sequence, depth.clone()));
        Ok(())
    }

    async fn insert_trade(
        &self,
        _instrument: &Instrument,
        trade: &Trade,
        sequence: u64,
    ) -> FeedResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FeedError::Database(sqlx::Error::PoolClosed));
        }
        self.trades.lock().push((sequence, trade.clone()));
        Ok(())
    }
}

/// Minimal venue: already-chronological trades, plain `bids`/`asks` book.
#[derive(Debug, Default, Clone)]
struct ScriptedVenue;

impl ExchangeAdapter for ScriptedVenue {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn order_book_target(&self, _instrument: &InstrumentId) -> RequestTarget {
        RequestTarget::new("http://scripted.test/book")
    }

    fn trades_target(&self, _instrument: &InstrumentId) -> RequestTarget {
        RequestTarget::new("http://scripted.test/trades")
    }

    fn parse_order_book(
        &self,
        instrument: &InstrumentId,
        raw: &Value,
        depth: usize,
    ) -> FeedResult<L2Depth> {
        let mut ladder = L2Depth::empty();
        for (key, side) in [("bids", &mut ladder.bids), ("asks", &mut ladder.asks)] {
            let levels = raw
                .get(key)
                .and_then(Value::as_array)
                .ok_or_else(|| FeedError::malformed(instrument, format!("missing {key}"), raw))?;
            for level in levels.iter().take(depth) {
                let entries = level.as_array().ok_or_else(|| {
                    FeedError::malformed(instrument, "level is not an array", raw)
                })?;
                side.push(PriceLevel {
                    price: coerce_f64(&entries[0]).unwrap_or(0.0),
                    volume: coerce_f64(&entries[1]).unwrap_or(0.0),
                });
            }
        }
        Ok(ladder)
    }

    fn parse_trades(&self, instrument: &InstrumentId, raw: &Value) -> FeedResult<Vec<Trade>> {
        let entries = raw
            .as_array()
            .ok_or_else(|| FeedError::malformed(instrument, "not an array", raw))?;
        entries
            .iter()
            .map(|entry| {
                let trade_id = entry
                    .get("id")
                    .and_then(coerce_string)
                    .ok_or_else(|| FeedError::malformed(instrument, "missing id", entry))?;
                Ok(Trade {
                    trade_id,
                    trade_side: TradeSide::parse(
                        &entry
                            .get("side")
                            .and_then(coerce_string)
                            .unwrap_or_default(),
                    ),
                    trade_price: entry.get("price").and_then(coerce_f64).unwrap_or(0.0),
                    trade_volume: entry.get("qty").and_then(coerce_f64).unwrap_or(0.0),
                    // No venue timestamp in this format: capture time stands in.
                    date_time: Utc::now(),
                })
            })
            .collect()
    }
}

fn instrument() -> Arc<Instrument> {
    Arc::new(Instrument::new(InstrumentId {
        exchange: "scripted".to_string(),
        name: "BTC_USDT".to_string(),
        code: "btc_usdt".to_string(),
    }))
}

fn book_worker(
    instmt: Arc<Instrument>,
    transport: Arc<ScriptedTransport>,
    sink: Arc<RecordingSink>,
) -> PollingWorker {
    PollingWorker::new(
        instmt,
        Arc::new(ScriptedVenue),
        transport,
        sink,
        PollConfig::default(),
    )
}

fn trade_worker(
    instmt: Arc<Instrument>,
    transport: Arc<ScriptedTransport>,
    sink: Arc<RecordingSink>,
) -> TradeIngestWorker {
    TradeIngestWorker::new(
        instmt,
        Arc::new(ScriptedVenue),
        transport,
        sink,
        PollConfig::default(),
    )
}

fn trade_batch() -> Value {
    json!([
        {"id": "5", "price": 100.0, "qty": 1.0, "side": "buy"},
        {"id": "7", "price": 100.5, "qty": 0.5, "side": "sell"},
        {"id": "6", "price": 100.2, "qty": 0.2, "side": "buy"},
        {"id": "9", "price": 101.0, "qty": 0.1, "side": "sell"},
    ])
}

#[tokio::test]
async fn accepts_only_ids_above_the_running_watermark() {
    let instmt = instrument();
    instmt.set_last_trade_id("5");
    let transport = ScriptedTransport::new(vec![Ok(trade_batch())]);
    let sink = RecordingSink::new();

    let worker = trade_worker(instmt.clone(), transport, sink.clone());
    assert_eq!(worker.run_cycle().await, TradeCycle::Accepted(2));

    // 6 does not exceed the watermark at the time it is evaluated.
    assert_eq!(sink.trade_ids(), vec!["7", "9"]);
    assert_eq!(instmt.last_trade_id(), "9");
    assert_eq!(instmt.trade_sequence(), 2);

    // Sequences were assigned in watermark order.
    let sequences: Vec<u64> = sink.trades.lock().iter().map(|(seq, _)| *seq).collect();
    assert_eq!(sequences, vec![1, 2]);
}

#[tokio::test]
async fn replaying_an_accepted_batch_is_idempotent() {
    let instmt = instrument();
    instmt.set_last_trade_id("5");
    let transport = ScriptedTransport::new(vec![Ok(trade_batch()), Ok(trade_batch())]);
    let sink = RecordingSink::new();

    let worker = trade_worker(instmt.clone(), transport, sink.clone());
    assert_eq!(worker.run_cycle().await, TradeCycle::Accepted(2));
    assert_eq!(worker.run_cycle().await, TradeCycle::Accepted(0));

    assert_eq!(sink.trade_ids(), vec!["7", "9"]);
    assert_eq!(instmt.last_trade_id(), "9");
    assert_eq!(instmt.trade_sequence(), 2);
}

#[tokio::test]
async fn recovery_latches_on_first_non_empty_fetch_only() {
    let instmt = instrument();
    let transport = ScriptedTransport::new(vec![
        Ok(json!([])),                       // empty: no recovery yet
        Err(ScriptedTransport::failure()),   // error: no recovery yet
        Ok(trade_batch()),                   // first real batch
        Err(ScriptedTransport::failure()),   // later errors do not reset it
    ]);
    let sink = RecordingSink::new();
    let worker = trade_worker(instmt.clone(), transport, sink);

    assert_eq!(worker.run_cycle().await, TradeCycle::Empty);
    assert!(!instmt.is_recovered());

    assert_eq!(worker.run_cycle().await, TradeCycle::Failed);
    assert!(!instmt.is_recovered());

    assert!(matches!(worker.run_cycle().await, TradeCycle::Accepted(_)));
    assert!(instmt.is_recovered());

    assert_eq!(worker.run_cycle().await, TradeCycle::Failed);
    assert!(instmt.is_recovered());
}

#[tokio::test]
async fn recovery_fires_even_when_every_trade_is_dropped() {
    let instmt = instrument();
    instmt.set_last_trade_id("100");
    let transport = ScriptedTransport::new(vec![Ok(trade_batch())]);
    let sink = RecordingSink::new();
    let worker = trade_worker(instmt.clone(), transport, sink.clone());

    assert_eq!(worker.run_cycle().await, TradeCycle::Accepted(0));
    assert!(instmt.is_recovered());
    assert!(sink.trade_ids().is_empty());
}

#[tokio::test]
async fn non_numeric_trade_id_fails_the_batch_without_state_changes() {
    let instmt = instrument();
    instmt.set_last_trade_id("5");
    let batch = json!([
        {"id": "7", "price": 100.5, "qty": 0.5, "side": "sell"},
        {"id": "seven-b", "price": 100.6, "qty": 0.5, "side": "sell"},
    ]);
    let transport = ScriptedTransport::new(vec![Ok(batch)]);
    let sink = RecordingSink::new();
    let worker = trade_worker(instmt.clone(), transport, sink.clone());

    assert_eq!(worker.run_cycle().await, TradeCycle::Failed);
    assert_eq!(instmt.last_trade_id(), "5");
    assert_eq!(instmt.trade_sequence(), 0);
    assert!(sink.trade_ids().is_empty());
    assert!(!instmt.is_recovered());
}

#[tokio::test]
async fn book_sequence_advances_only_on_persisted_snapshots() {
    let instmt = instrument();
    let transport = ScriptedTransport::new(vec![
        Ok(json!({"bids": [[100.0, 1.0]], "asks": [[100.5, 1.5]]})),
        Ok(Value::Null), // empty body: no-op cycle
        Err(ScriptedTransport::failure()),
        Ok(json!({"bids": [[101.0, 2.0]], "asks": [[101.5, 0.5]]})),
    ]);
    let sink = RecordingSink::new();
    let worker = book_worker(instmt.clone(), transport, sink.clone());

    assert_eq!(worker.run_cycle().await, BookCycle::Persisted(1));
    assert_eq!(worker.run_cycle().await, BookCycle::Empty);
    assert_eq!(instmt.order_book_sequence(), 1);
    assert_eq!(worker.run_cycle().await, BookCycle::Failed);
    assert_eq!(instmt.order_book_sequence(), 1);
    assert_eq!(worker.run_cycle().await, BookCycle::Persisted(2));
    assert_eq!(instmt.order_book_sequence(), 2);
    assert_eq!(sink.books.lock().len(), 2);
}

#[tokio::test]
async fn snapshot_rotation_keeps_the_previous_depth() {
    let instmt = instrument();
    let transport = ScriptedTransport::new(vec![
        Ok(json!({"bids": [[100.0, 1.0], [99.5, 2.0]], "asks": [[100.5, 1.5]]})),
        Ok(json!({"bids": [[100.1, 1.0]], "asks": [[100.6, 1.5]]})),
    ]);
    let sink = RecordingSink::new();
    let worker = book_worker(instmt.clone(), transport, sink);

    worker.run_cycle().await;
    let first = instmt.current_depth();
    assert_eq!(first.bids[0], PriceLevel { price: 100.0, volume: 1.0 });
    assert_eq!(first.bids[1], PriceLevel { price: 99.5, volume: 2.0 });
    assert_eq!(first.asks[0], PriceLevel { price: 100.5, volume: 1.5 });
    assert!(instmt.previous_depth().is_empty());

    worker.run_cycle().await;
    assert_eq!(instmt.previous_depth(), first);
    assert_eq!(instmt.current_depth().bids[0].price, 100.1);
}

#[tokio::test]
async fn malformed_book_leaves_all_state_untouched() {
    let instmt = instrument();
    let transport = ScriptedTransport::new(vec![
        Ok(json!({"bids": [[100.0, 1.0]], "asks": [[100.5, 1.5]]})),
        Ok(json!({"bids": [[100.0, 1.0]]})), // asks missing
    ]);
    let sink = RecordingSink::new();
    let worker = book_worker(instmt.clone(), transport, sink.clone());

    worker.run_cycle().await;
    let current = instmt.current_depth();
    let previous = instmt.previous_depth();

    assert_eq!(worker.run_cycle().await, BookCycle::Failed);
    assert_eq!(instmt.current_depth(), current);
    assert_eq!(instmt.previous_depth(), previous);
    assert_eq!(instmt.order_book_sequence(), 1);
    assert_eq!(sink.books.lock().len(), 1);
}

#[tokio::test]
async fn sink_failures_do_not_stop_either_worker() {
    let instmt = instrument();
    let transport = ScriptedTransport::new(vec![
        Ok(json!({"bids": [[100.0, 1.0]], "asks": [[100.5, 1.5]]})),
        Ok(json!({"bids": [[101.0, 1.0]], "asks": [[101.5, 1.5]]})),
    ]);
    let sink = RecordingSink::new();
    sink.failing.store(true, Ordering::SeqCst);
    let worker = book_worker(instmt.clone(), transport, sink.clone());

    // The write is lost but the cycle completes and sequencing continues.
    assert_eq!(worker.run_cycle().await, BookCycle::Persisted(1));
    sink.failing.store(false, Ordering::SeqCst);
    assert_eq!(worker.run_cycle().await, BookCycle::Persisted(2));
    assert_eq!(sink.books.lock().len(), 1);

    let trade_transport = ScriptedTransport::new(vec![Ok(trade_batch())]);
    let trade_sink = RecordingSink::new();
    trade_sink.failing.store(true, Ordering::SeqCst);
    let worker = trade_worker(instmt.clone(), trade_transport, trade_sink.clone());
    assert_eq!(worker.run_cycle().await, TradeCycle::Accepted(4));
    assert!(trade_sink.trade_ids().is_empty());
    assert_eq!(instmt.last_trade_id(), "9");
}

#[tokio::test]
async fn aex_trade_scenario_end_to_end() {
    let instmt = Arc::new(Instrument::new(InstrumentId {
        exchange: "aex".to_string(),
        name: "BTC_USDT".to_string(),
        code: "btc_usdt".to_string(),
    }));
    instmt.set_last_trade_id("10");

    let payload = json!([
        {"tid": "12", "price": "5000", "amount": "0.1", "type": "buy", "date": 1000},
    ]);
    let transport = ScriptedTransport::new(vec![Ok(payload)]);
    let sink = RecordingSink::new();
    let worker = TradeIngestWorker::new(
        instmt.clone(),
        adapter_for("aex").unwrap(),
        transport,
        sink.clone(),
        PollConfig::default(),
    );

    assert_eq!(worker.run_cycle().await, TradeCycle::Accepted(1));
    let trades = sink.trades.lock();
    let (sequence, trade) = &trades[0];
    assert_eq!(*sequence, 1);
    assert_eq!(trade.trade_side, TradeSide::Buy);
    assert_eq!(trade.trade_price, 5000.0);
    assert_eq!(trade.trade_volume, 0.1);
    assert_eq!(instmt.last_trade_id(), "12");
}

#[tokio::test]
async fn gateway_spawns_a_worker_pair_that_honours_shutdown() {
    let instmt = instrument();
    let transport = ScriptedTransport::new(vec![]);
    let sink = RecordingSink::new();
    let gateway = ExchangeGateway::new(
        Arc::new(ScriptedVenue),
        transport,
        sink,
        PollConfig {
            poll_interval: Duration::from_millis(10),
            error_backoff: Duration::from_millis(10),
            depth: 5,
        },
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let handles = gateway.start(instmt.clone(), shutdown_rx);
    assert_eq!(handles.len(), 2);
    assert!(!instmt.is_recovered());

    shutdown_tx.send(true).unwrap();
    for handle in handles {
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("worker did not stop on shutdown")
            .unwrap();
    }
}
