//! Per-instrument polling loops.
//!
//! One task per (instrument, feed-type). Each cycle is fetch -> parse ->
//! update state -> persist; every failure is absorbed into a backoff sleep
//! and the loop carries on indefinitely. Upstream outages are expected to be
//! transient, so there is no retry cap or circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::instrument::Instrument;
use crate::market_data::adapters::ExchangeAdapter;
use crate::market_data::types::{is_empty_payload, Trade, DEFAULT_DEPTH};
use crate::persist::PersistenceSink;
use crate::transport::RestTransport;

/// Steady-state polling cadence and the sleep inserted after a failed or
/// empty fetch.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub poll_interval: Duration,
    pub error_backoff: Duration,
    /// Levels kept per ladder side.
    pub depth: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            error_backoff: Duration::from_secs(5),
            depth: DEFAULT_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookCycle {
    /// A snapshot was installed under the given sequence.
    Persisted(u64),
    Empty,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeCycle {
    /// Batch processed; count of trades newly accepted past the watermark.
    Accepted(usize),
    Empty,
    Failed,
}

/// Sleep for `duration` unless shutdown fires first. Returns false when the
/// worker should stop.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.changed() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Order-book polling worker: fetch, parse, rotate the instrument's
/// snapshot pair, persist under a fresh sequence.
pub struct PollingWorker {
    instrument: Arc<Instrument>,
    adapter: Arc<dyn ExchangeAdapter>,
    transport: Arc<dyn RestTransport>,
    sink: Arc<dyn PersistenceSink>,
    config: PollConfig,
}

impl PollingWorker {
    pub fn new(
        instrument: Arc<Instrument>,
        adapter: Arc<dyn ExchangeAdapter>,
        transport: Arc<dyn RestTransport>,
        sink: Arc<dyn PersistenceSink>,
        config: PollConfig,
    ) -> Self {
        Self {
            instrument,
            adapter,
            transport,
            sink,
            config,
        }
    }

    /// One fetch/parse/persist cycle. Never holds an instrument lock across
    /// an await.
    pub async fn run_cycle(&self) -> BookCycle {
        let id = &self.instrument.id;
        let target = self.adapter.order_book_target(id);
        let raw = match self.transport.request(&target).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    exchange = %id.exchange,
                    instrument = %id.name,
                    error = %err,
                    "order book fetch failed"
                );
                counter!("tickfeed_book_errors_total", "exchange" => id.exchange.clone())
                    .increment(1);
                return BookCycle::Failed;
            }
        };

        if is_empty_payload(&raw) {
            return BookCycle::Empty;
        }

        let depth = match self.adapter.parse_order_book(id, &raw, self.config.depth) {
            Ok(depth) => depth,
            Err(err) => {
                // The payload echo rides on the error itself.
                error!(
                    exchange = %id.exchange,
                    instrument = %id.name,
                    error = %err,
                    "order book parse failed"
                );
                counter!("tickfeed_book_errors_total", "exchange" => id.exchange.clone())
                    .increment(1);
                return BookCycle::Failed;
            }
        };

        let sequence = self.instrument.apply_snapshot(depth.clone());
        if let Err(err) = self
            .sink
            .insert_order_book(&self.instrument, &depth, sequence)
            .await
        {
            // A sink failure must not take the polling loop down.
            error!(
                exchange = %id.exchange,
                instrument = %id.name,
                sequence,
                error = %err,
                "order book persist failed"
            );
        }
        counter!("tickfeed_book_snapshots_total", "exchange" => id.exchange.clone()).increment(1);
        BookCycle::Persisted(sequence)
    }

    /// Run until the shutdown signal fires. The backoff sleep after a failed
    /// cycle is additive to the per-cycle interval.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let id = &self.instrument.id;
        debug!(exchange = %id.exchange, instrument = %id.name, "order book worker started");
        loop {
            let outcome = self.run_cycle().await;
            if outcome == BookCycle::Failed
                && !sleep_or_shutdown(self.config.error_backoff, &mut shutdown).await
            {
                break;
            }
            if !sleep_or_shutdown(self.config.poll_interval, &mut shutdown).await {
                break;
            }
        }
        info!(exchange = %id.exchange, instrument = %id.name, "order book worker stopped");
    }
}

/// Trade polling worker: fetch, dedup against the instrument's watermark,
/// persist accepted trades, latch the recovery flag.
pub struct TradeIngestWorker {
    instrument: Arc<Instrument>,
    adapter: Arc<dyn ExchangeAdapter>,
    transport: Arc<dyn RestTransport>,
    sink: Arc<dyn PersistenceSink>,
    config: PollConfig,
}

impl TradeIngestWorker {
    pub fn new(
        instrument: Arc<Instrument>,
        adapter: Arc<dyn ExchangeAdapter>,
        transport: Arc<dyn RestTransport>,
        sink: Arc<dyn PersistenceSink>,
        config: PollConfig,
    ) -> Self {
        Self {
            instrument,
            adapter,
            transport,
            sink,
            config,
        }
    }

    pub async fn run_cycle(&self) -> TradeCycle {
        let id = &self.instrument.id;
        let target = self.adapter.trades_target(id);
        let raw = match self.transport.request(&target).await {
            Ok(raw) => raw,
            Err(err) => {
                warn!(
                    exchange = %id.exchange,
                    instrument = %id.name,
                    error = %err,
                    "trades fetch failed"
                );
                counter!("tickfeed_trade_errors_total", "exchange" => id.exchange.clone())
                    .increment(1);
                return TradeCycle::Failed;
            }
        };

        if is_empty_payload(&raw) {
            return TradeCycle::Empty;
        }

        let trades = match self.adapter.parse_trades(id, &raw) {
            Ok(trades) => trades,
            Err(err) => {
                error!(
                    exchange = %id.exchange,
                    instrument = %id.name,
                    error = %err,
                    "trades parse failed"
                );
                counter!("tickfeed_trade_errors_total", "exchange" => id.exchange.clone())
                    .increment(1);
                return TradeCycle::Failed;
            }
        };
        if trades.is_empty() {
            return TradeCycle::Empty;
        }

        // Validate every id before accepting any: a venue emitting
        // non-numeric ids has broken the ordering contract and the whole
        // batch is rejected, not partially applied.
        let mut parsed: Vec<(i128, &Trade)> = Vec::with_capacity(trades.len());
        for trade in &trades {
            match trade.trade_id.parse::<i128>() {
                Ok(numeric) => parsed.push((numeric, trade)),
                Err(_) => {
                    error!(
                        exchange = %id.exchange,
                        instrument = %id.name,
                        trade_id = %trade.trade_id,
                        "non-numeric trade id, dropping batch"
                    );
                    counter!("tickfeed_trade_errors_total", "exchange" => id.exchange.clone())
                        .increment(1);
                    return TradeCycle::Failed;
                }
            }
        }

        let mut accepted = 0usize;
        for (incoming, trade) in parsed {
            match self.instrument.try_advance_watermark(&trade.trade_id, incoming) {
                Some(sequence) => {
                    if let Err(err) = self.sink.insert_trade(&self.instrument, trade, sequence).await
                    {
                        error!(
                            exchange = %id.exchange,
                            instrument = %id.name,
                            sequence,
                            error = %err,
                            "trade persist failed"
                        );
                    }
                    accepted += 1;
                }
                None => {
                    // Expected steady state: replayed window overlaps the
                    // watermark.
                    debug!(trade_id = %trade.trade_id, "stale or duplicate trade dropped");
                }
            }
        }
        if accepted > 0 {
            counter!("tickfeed_trades_accepted_total", "exchange" => id.exchange.clone())
                .increment(accepted as u64);
        }

        if self.instrument.mark_recovered() {
            info!(exchange = %id.exchange, instrument = %id.name, "trade feed recovered");
        }

        TradeCycle::Accepted(accepted)
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let id = &self.instrument.id;
        debug!(exchange = %id.exchange, instrument = %id.name, "trade worker started");
        loop {
            match self.run_cycle().await {
                TradeCycle::Failed | TradeCycle::Empty => {
                    if !sleep_or_shutdown(self.config.error_backoff, &mut shutdown).await {
                        break;
                    }
                }
                TradeCycle::Accepted(_) => {
                    if !sleep_or_shutdown(self.config.poll_interval, &mut shutdown).await {
                        break;
                    }
                }
            }
        }
        info!(exchange = %id.exchange, instrument = %id.name, "trade worker stopped");
    }
}
