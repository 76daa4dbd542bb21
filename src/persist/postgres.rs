//! Postgres persistence sink.
//!
//! Order-book snapshots go to the per-instrument table resolved at startup
//! (`{exchange}_{instrument}_snapshot`); trades share one `trades` table.
//! Ladder sides are stored as JSONB arrays of the observed levels, so an
//! absent level is absent in the row too and never aliases a zero-volume
//! quote. Schema management is the operator's concern, not this crate's.

use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::error::FeedResult;
use crate::instrument::Instrument;
use crate::market_data::types::{L2Depth, Trade, TIMESTAMP_FORMAT};
use crate::persist::PersistenceSink;

pub struct PostgresSink {
    pool: PgPool,
}

impl PostgresSink {
    pub async fn connect(database_url: &str) -> FeedResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self { pool })
    }

    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PersistenceSink for PostgresSink {
    async fn insert_order_book(
        &self,
        instrument: &Instrument,
        depth: &L2Depth,
        sequence: u64,
    ) -> FeedResult<()> {
        // Table name comes from startup configuration, not from the wire.
        let sql = format!(
            "INSERT INTO {} (sequence, date_time, bids, asks) VALUES ($1, $2, $3, $4)",
            instrument.snapshot_table
        );
        sqlx::query(&sql)
            .bind(sequence as i64)
            .bind(depth.timestamp.format(TIMESTAMP_FORMAT).to_string())
            .bind(Json(depth.bids.as_slice()))
            .bind(Json(depth.asks.as_slice()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_trade(
        &self,
        instrument: &Instrument,
        trade: &Trade,
        sequence: u64,
    ) -> FeedResult<()> {
        sqlx::query(
            "INSERT INTO trades \
             (exchange, instrument, sequence, trade_id, side, price, volume, date_time) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&instrument.id.exchange)
        .bind(&instrument.id.name)
        .bind(sequence as i64)
        .bind(&trade.trade_id)
        .bind(trade.trade_side.as_str())
        .bind(trade.trade_price)
        .bind(trade.trade_volume)
        .bind(trade.date_time.format(TIMESTAMP_FORMAT).to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
