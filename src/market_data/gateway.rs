//! Wires one instrument to its order-book and trade worker pair.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::instrument::Instrument;
use crate::market_data::adapters::ExchangeAdapter;
use crate::market_data::worker::{PollConfig, PollingWorker, TradeIngestWorker};
use crate::persist::PersistenceSink;
use crate::transport::RestTransport;

pub struct ExchangeGateway {
    adapter: Arc<dyn ExchangeAdapter>,
    transport: Arc<dyn RestTransport>,
    sink: Arc<dyn PersistenceSink>,
    config: PollConfig,
}

impl ExchangeGateway {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        transport: Arc<dyn RestTransport>,
        sink: Arc<dyn PersistenceSink>,
        config: PollConfig,
    ) -> Self {
        Self {
            adapter,
            transport,
            sink,
            config,
        }
    }

    /// Reset per-symbol state and launch the two workers as independent
    /// tasks. The caller owns the returned handles and the shutdown sender;
    /// dropping the sender or sending `true` stops both workers.
    pub fn start(
        &self,
        instrument: Arc<Instrument>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        instrument.reset_for_start();
        info!(
            exchange = %instrument.id.exchange,
            instrument = %instrument.id.name,
            table = %instrument.snapshot_table,
            "starting worker pair"
        );

        let book = PollingWorker::new(
            Arc::clone(&instrument),
            Arc::clone(&self.adapter),
            Arc::clone(&self.transport),
            Arc::clone(&self.sink),
            self.config,
        );
        let trades = TradeIngestWorker::new(
            instrument,
            Arc::clone(&self.adapter),
            Arc::clone(&self.transport),
            Arc::clone(&self.sink),
            self.config,
        );

        vec![
            tokio::spawn(book.run(shutdown.clone())),
            tokio::spawn(trades.run(shutdown)),
        ]
    }
}
