pub mod postgres;

use async_trait::async_trait;

use crate::error::FeedResult;
use crate::instrument::Instrument;
use crate::market_data::types::{L2Depth, Trade};

/// Durable storage for normalized snapshots and trades.
///
/// Implementations must be safe under concurrent invocation from many
/// workers; each call is one self-contained write, never part of a
/// transaction spanning workers. The snapshot and sequence are passed by
/// value so no instrument lock is held across the write.
#[async_trait]
pub trait PersistenceSink: Send + Sync {
    async fn insert_order_book(
        &self,
        instrument: &Instrument,
        depth: &L2Depth,
        sequence: u64,
    ) -> FeedResult<()>;

    async fn insert_trade(
        &self,
        instrument: &Instrument,
        trade: &Trade,
        sequence: u64,
    ) -> FeedResult<()>;
}
